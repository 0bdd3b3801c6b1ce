use anyhow::Result;
use std::sync::Arc;

use secant::app_config::AppConfig;
use secant::engine::create_engine;
use secant::pipeline::orchestrator::{GenerationParams, Orchestrator};
use secant::plugins::PluginRegistry;
use secant::server::{AppContext, router};
use secant::tool::HttpToolInvoker;

fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    // If user hasn't set RUST_LOG, default to info for the server.
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Info);
    }
    let _ = builder.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let config = AppConfig::load()?;
    let engine = create_engine(&config.engine).await?;
    log::info!(
        "engine ready: {} (model {})",
        engine.name(),
        engine.model()
    );

    let registry = Arc::new(PluginRegistry::with_builtins());
    log::info!("{} plugin(s) registered", registry.len());

    let invoker = Arc::new(HttpToolInvoker::new(config.tools.timeout_seconds)?);
    let orchestrator = Arc::new(Orchestrator::new(
        engine.clone(),
        invoker,
        GenerationParams::from_engine_config(&config.engine),
    ));

    let ctx = AppContext {
        orchestrator,
        registry,
        engine_name: engine.name().to_string(),
        engine_model: engine.model().to_string(),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    log::info!("listening on {}", config.server.bind);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}
