use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use super::{FragmentStream, GenerationEngine, GenerationRequest};
use crate::app_config::EngineConfig;
use crate::errors::EngineError;
use crate::types::EngineModel;

type ByteStream = Pin<Box<dyn futures::Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Engine backed by a local Ollama server's `/api/chat` endpoint.
pub struct OllamaEngine {
    client: reqwest::Client,
    host: String,
    model: EngineModel,
}

impl OllamaEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            host: config.host.clone(),
            model: EngineModel::new(config.model.clone()),
        })
    }

    pub async fn is_available(host: &str) -> bool {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };

        match client.get(format!("{host}/api/tags")).send().await {
            Ok(res) => res.status().is_success(),
            Err(_) => false,
        }
    }

    fn chat_body(&self, req: &GenerationRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model.as_str(),
            "messages": req.messages,
            "stream": stream,
            "options": { "num_predict": req.max_tokens },
        });
        if let Some(temp) = req.temperature {
            body["options"]["temperature"] = json!(temp);
        }
        body
    }

    async fn post_chat(
        &self,
        req: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, EngineError> {
        let res = self
            .client
            .post(format!("{}/api/chat", self.host))
            .header("Content-Type", "application/json")
            .json(&self.chat_body(req, stream))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let err_text = res.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!(
                "Ollama API Error {status}: {err_text}"
            )));
        }
        Ok(res)
    }

    /// Pull the assistant text out of one `/api/chat` response object.
    fn message_content(value: &Value) -> Option<&str> {
        value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
    }
}

struct LineState {
    bytes: ByteStream,
    buf: String,
    pending: VecDeque<String>,
    done: bool,
}

#[async_trait::async_trait]
impl GenerationEngine for OllamaEngine {
    async fn generate(&self, req: &GenerationRequest) -> Result<String, EngineError> {
        let res = self.post_chat(req, false).await?;
        let response_json: Value = res.json().await?;

        let content = Self::message_content(&response_json).ok_or_else(|| {
            EngineError::InvalidResponse("No message content in response".to_string())
        })?;
        Ok(content.to_string())
    }

    async fn generate_stream(&self, req: &GenerationRequest) -> Result<FragmentStream, EngineError> {
        let res = self.post_chat(req, true).await?;
        let bytes: ByteStream = Box::pin(res.bytes_stream().map(|r| r.map(|b| b.to_vec())));

        // Ollama streams one JSON object per line; each carries a content
        // fragment, the last one has "done": true.
        let state = LineState {
            bytes,
            buf: String::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(frag) = st.pending.pop_front() {
                    return Some((Ok(frag), st));
                }
                if st.done {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        st.buf.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(pos) = st.buf.find('\n') {
                            let line: String = st.buf.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<Value>(line) {
                                Ok(obj) => {
                                    if let Some(text) = OllamaEngine::message_content(&obj) {
                                        if !text.is_empty() {
                                            st.pending.push_back(text.to_string());
                                        }
                                    }
                                    if obj.get("done").and_then(Value::as_bool) == Some(true) {
                                        st.done = true;
                                    }
                                }
                                Err(e) => {
                                    st.done = true;
                                    return Some((
                                        Err(EngineError::InvalidResponse(format!(
                                            "bad stream line: {e}"
                                        ))),
                                        st,
                                    ));
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(EngineError::Http(e)), st));
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &EngineModel {
        &self.model
    }

    fn validate_config(&self) -> Result<(), EngineError> {
        if self.host.is_empty() {
            return Err(EngineError::Config("Ollama host is empty".to_string()));
        }
        Ok(())
    }
}
