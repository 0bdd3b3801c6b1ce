use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration, loaded from the user-owned `.secant/config.json`
/// with environment variables taking precedence over file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub tools: ToolsConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new(".secant/config.json");
        let mut config: Self = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(kind) = env::var("ENGINE") {
            self.engine.kind = Some(kind);
        }
        if let Ok(host) = env::var("OLLAMA_HOST") {
            self.engine.host = host;
        }
        if let Ok(model) = env::var("MODEL").or_else(|_| env::var("OLLAMA_MODEL")) {
            self.engine.model = model;
        }
        if let Ok(bind) = env::var("SECANT_BIND") {
            self.server.bind = bind;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit engine choice ("ollama" or "mock"). When unset the engine is
    /// auto-detected by probing the Ollama host.
    pub kind: Option<String>,
    pub host: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: None,
            host: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub timeout_seconds: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { timeout_seconds: 5 }
    }
}
