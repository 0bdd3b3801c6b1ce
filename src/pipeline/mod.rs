use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

pub mod fallback;
pub mod orchestrator;
pub mod steps;

use crate::engine::ChatMessage;
use crate::plugins::{Capability, PluginDescriptor};
use crate::tool::ToolResult;

/// Symbolic tag of one stage of the narrated decision sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Acknowledge,
    ToolSelection,
    EndpointSelection,
    Execution,
    ApiResponse,
    Summary,
    Error,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Acknowledge => "acknowledge",
            StepName::ToolSelection => "tool_selection",
            StepName::EndpointSelection => "endpoint_selection",
            StepName::Execution => "execution",
            StepName::ApiResponse => "api_response",
            StepName::Summary => "summary",
            StepName::Error => "error",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    System,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMeta {
    pub id: u32,
    pub name: StepName,
    pub role: StepRole,
}

/// One line of the streamed response.
///
/// All fields are optional on the wire so consumers tolerate records they do
/// not know; step events always carry `text`, `step`, and (except for
/// execution and error) `reasoning`. A `step.name == error` event or a bare
/// `error` record is always the last line of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEvent {
    pub fn step(
        meta: StepMeta,
        text: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            text: Some(text.into()),
            reasoning: Some(reasoning.into()),
            step: Some(meta),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// A plain answer fragment from the no-tool path.
    pub fn fragment(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Announcement that a plugin was chosen automatically.
    pub fn plugin_used(name: impl Into<String>) -> Self {
        Self {
            plugin_used: Some(name.into()),
            ..Self::default()
        }
    }

    /// Terminal record for a failure outside the step sequence (engine load,
    /// timeout). Ends the stream.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        self.error.is_some()
            || self
                .step
                .map(|s| s.name == StepName::Error)
                .unwrap_or(false)
    }
}

/// Per-run accumulator owned by the orchestrator. Lives exactly as long as
/// one streamed response and is never shared across requests.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub query: String,
    pub history: Vec<ChatMessage>,
    pub plugin: PluginDescriptor,
    pub capability: Capability,
    pub last_result: Option<ToolResult>,
    pub emitted: u32,
}

impl PipelineContext {
    pub fn new(query: impl Into<String>, plugin: PluginDescriptor) -> Self {
        let capability = plugin.first_capability().clone();
        Self {
            query: query.into(),
            history: Vec::new(),
            plugin,
            capability,
            last_result: None,
            emitted: 0,
        }
    }
}

pub type EventStream = Pin<Box<dyn futures::Stream<Item = StepEvent> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_serialize_snake_case() {
        let json = serde_json::to_value(StepName::EndpointSelection).unwrap();
        assert_eq!(json, "endpoint_selection");
        let json = serde_json::to_value(StepName::ApiResponse).unwrap();
        assert_eq!(json, "api_response");
    }

    #[test]
    fn optional_fields_are_omitted_on_the_wire() {
        let line = serde_json::to_string(&StepEvent::fragment("hello")).unwrap();
        assert_eq!(line, r#"{"text":"hello"}"#);

        let line = serde_json::to_string(&StepEvent::plugin_used("IPinfo")).unwrap();
        assert_eq!(line, r#"{"plugin_used":"IPinfo"}"#);
    }

    #[test]
    fn error_step_and_failure_record_are_both_terminal() {
        let meta = StepMeta {
            id: 5,
            name: StepName::Error,
            role: StepRole::System,
        };
        assert!(StepEvent::step(meta, "failed", "why").is_terminal_error());
        assert!(StepEvent::failure("engine down").is_terminal_error());
        assert!(!StepEvent::fragment("hi").is_terminal_error());
    }
}
