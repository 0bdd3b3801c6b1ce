use thiserror::Error;

use crate::types::PluginId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine API error: {0}")]
    Api(String),

    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    #[error("engine config error: {0}")]
    Config(String),

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("plugin {0} not found")]
    NotFound(PluginId),
}
