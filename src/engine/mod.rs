use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub mod mock;
pub mod ollama;

use crate::app_config::EngineConfig;
use crate::errors::EngineError;
use crate::types::EngineModel;

/// One turn of a chat transcript, in the shape the Ollama chat API expects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: text.into(),
        }
    }
}

/// Request structure for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// System prompt plus a single user turn, the common case for step
    /// prompts.
    pub fn prompted(
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            temperature,
        }
    }
}

pub type FragmentStream = Pin<Box<dyn futures::Stream<Item = Result<String, EngineError>> + Send>>;

/// Trait for text generation backends.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Run one completion and return the full text.
    async fn generate(&self, req: &GenerationRequest) -> Result<String, EngineError>;

    /// Run one completion, yielding text fragments as they are produced.
    async fn generate_stream(&self, req: &GenerationRequest) -> Result<FragmentStream, EngineError>;

    /// Get the name of this engine
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &EngineModel;

    /// Validate that this engine is properly configured
    fn validate_config(&self) -> Result<(), EngineError>;
}

/// Cloneable handle to the shared generation engine.
///
/// The engine is typically one loaded model, so calls are serialized through a
/// single-permit gate while the rest of a request (tool calls, delivery) runs
/// concurrently with other requests. For streaming, the permit is held until
/// the fragment stream is exhausted or dropped.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<dyn GenerationEngine>,
    gate: Arc<Semaphore>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl EngineHandle {
    pub fn new(inner: Arc<dyn GenerationEngine>) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn generate(&self, req: &GenerationRequest) -> Result<String, EngineError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| EngineError::Api("engine gate closed".to_string()))?;
        self.inner.generate(req).await
    }

    pub async fn generate_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<FragmentStream, EngineError> {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Api("engine gate closed".to_string()))?;
        let stream = self.inner.generate_stream(req).await?;
        // Keep the permit alive for the lifetime of the stream.
        let gated = futures::stream::unfold((stream, permit), |(mut stream, permit)| async move {
            stream.next().await.map(|item| (item, (stream, permit)))
        });
        Ok(Box::pin(gated))
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn model(&self) -> &EngineModel {
        self.inner.model()
    }
}

/// Create an engine based on configuration priority:
/// 1. Explicit `kind` from config (already overlaid with the ENGINE env var)
/// 2. Local Ollama when its host answers
/// 3. Canned mock engine as the last resort
pub async fn create_engine(config: &EngineConfig) -> Result<EngineHandle, EngineError> {
    let engine: Arc<dyn GenerationEngine> = match config.kind.as_deref() {
        Some("ollama") => Arc::new(ollama::OllamaEngine::new(config)?),
        Some("mock") => Arc::new(mock::MockEngine::new()),
        Some(other) => {
            return Err(EngineError::Config(format!("unknown engine: {other}")));
        }
        None => {
            if ollama::OllamaEngine::is_available(&config.host).await {
                Arc::new(ollama::OllamaEngine::new(config)?)
            } else {
                log::warn!(
                    "Ollama not reachable at {}; falling back to the canned mock engine",
                    config.host
                );
                Arc::new(mock::MockEngine::new())
            }
        }
    };
    engine.validate_config()?;
    Ok(EngineHandle::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompted_request_has_system_then_user() {
        let req = GenerationRequest::prompted("be terse", "hello", 100, Some(0.2));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].role, "user");
        assert_eq!(req.messages[1].content, "hello");
    }

    #[tokio::test]
    async fn handle_serializes_calls_but_stays_usable() {
        let handle = EngineHandle::new(Arc::new(mock::MockEngine::new()));
        let req = GenerationRequest::prompted("", "hello", 10, None);
        let first = handle.generate(&req).await.unwrap();
        let second = handle.generate(&req).await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_engine_kind_is_a_config_error() {
        let config = EngineConfig {
            kind: Some("gpt9".to_string()),
            ..EngineConfig::default()
        };
        let err = create_engine(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
