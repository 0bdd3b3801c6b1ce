use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::pipeline::orchestrator::Orchestrator;
use crate::plugins::{PluginDescriptor, PluginRegistry, select::select};
use crate::stream::ndjson_frames;
use crate::types::PluginId;

/// Shared state for the serving edge: the orchestrator plus the read-only
/// plugin registry built at startup.
#[derive(Clone)]
pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<PluginRegistry>,
    pub engine_name: String,
    pub engine_model: String,
}

pub fn router(ctx: AppContext) -> axum::Router {
    axum::Router::new()
        .route("/api/query/stream", post(stream_query))
        .route("/api/plugins", get(list_plugins))
        .route("/health", get(health))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
pub struct StreamQueryRequest {
    pub query: String,
    #[serde(default)]
    pub plugin_id: Option<PluginId>,
    #[serde(default)]
    pub auto_select_plugin: bool,
}

/// Stream a narrated response for a query as NDJSON, one event per line.
///
/// Plugin resolution happens before any streaming so a bad explicit id is a
/// plain 404 rather than a broken stream.
async fn stream_query(
    State(ctx): State<AppContext>,
    Json(req): Json<StreamQueryRequest>,
) -> Response {
    log::info!("streaming request: {:.60}", req.query);

    let explicit = req.plugin_id;
    let heuristic = req.auto_select_plugin && explicit.is_none();

    let selected: Option<PluginDescriptor> = if explicit.is_some() || heuristic {
        match select(&req.query, explicit, &ctx.registry) {
            Ok(plugin) => plugin.cloned(),
            Err(e) => {
                return (StatusCode::NOT_FOUND, e.to_string()).into_response();
            }
        }
    } else {
        None
    };

    let announce = heuristic && selected.is_some();
    let events = ctx.orchestrator.run(req.query, selected, announce);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(ndjson_frames(events)))
        .unwrap_or_else(|e| {
            log::error!("failed to build streaming response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Read-only snapshot of the registered plugins.
async fn list_plugins(State(ctx): State<AppContext>) -> Json<Vec<PluginDescriptor>> {
    Json(ctx.registry.iter().cloned().collect())
}

async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "engine": ctx.engine_name,
        "model": ctx.engine_model,
    }))
}
