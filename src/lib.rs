pub mod app_config;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod pipeline;
pub mod plugins;
pub mod server;
pub mod stream;
pub mod tool;
pub mod types;

pub use crate::app_config::AppConfig;
pub use crate::engine::{EngineHandle, GenerationEngine};
pub use crate::pipeline::orchestrator::{GenerationParams, Orchestrator};
pub use crate::plugins::PluginRegistry;
