use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::ToolError;
use crate::plugins::{Capability, PluginDescriptor};

/// Result of one tool invocation. Created fresh per call and never persisted
/// by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<Value>,
    pub message: String,
}

impl ToolResult {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }
}

/// Uniform interface for invoking a plugin capability.
///
/// Implementations report failure through `ToolResult::success`, never by
/// returning an error: the pipeline turns failed results into a terminal
/// error event, and a panicking or throwing adapter would skip that.
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        plugin: &PluginDescriptor,
        capability: &Capability,
        target: Option<&str>,
    ) -> ToolResult;
}

/// HTTP adapter with a short bounded timeout per call.
pub struct HttpToolInvoker {
    client: reqwest::Client,
}

impl HttpToolInvoker {
    pub fn new(timeout_secs: u64) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(
        &self,
        plugin: &PluginDescriptor,
        capability: &Capability,
        target: Option<&str>,
    ) -> ToolResult {
        if capability.method != "GET" {
            return ToolResult::failed(format!(
                "unsupported method {} for capability {}",
                capability.method, capability.name
            ));
        }

        // Absent target means "the caller's own identity".
        let url = format!(
            "{}/{}{}",
            plugin.base_url,
            target.unwrap_or(""),
            capability.path
        );
        log::debug!("invoking {} capability {} at {url}", plugin.name, capability.name);

        let res = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                log::error!("tool call to {url} failed: {e}");
                return ToolResult::failed(format!("Error accessing {} API: {e}", plugin.name));
            }
        };

        if !res.status().is_success() {
            let status = res.status();
            log::error!("tool call to {url} returned {status}");
            return ToolResult::failed(format!("Error from {} API: {status}", plugin.name));
        }

        match res.json::<Value>().await {
            Ok(data) => ToolResult::ok(
                data,
                format!(
                    "{} information retrieved successfully from the {} capability",
                    plugin.name, capability.name
                ),
            ),
            Err(e) => ToolResult::failed(format!("Invalid response from {} API: {e}", plugin.name)),
        }
    }
}

/// Pull an explicit IPv4 target out of the query, if the user named one.
/// Only scanned when the query talks about an IP at all, matching how the
/// lookup tool is used conversationally.
pub fn extract_ip_target(query: &str) -> Option<String> {
    if !query.to_lowercase().contains("ip") {
        return None;
    }
    let re = regex::Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").ok()?;
    re.find(query).map(|m| m.as_str().to_string())
}
