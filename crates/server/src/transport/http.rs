use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tracing::Instrument;

use multiapi_common::api::jsonrpc::JsonRpcResponse;

use crate::app::App;

/// Shared state of the HTTP transport.
pub struct HttpState {
    pub app: App,
    pub started_at: Instant,
    /// `None` when no Prometheus recorder is installed (tests).
    pub metrics_handle: Option<PrometheusHandle>,
}

impl HttpState {
    pub fn new(app: App, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            app,
            started_at: Instant::now(),
            metrics_handle,
        }
    }
}

pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/tools", get(tools_handler))
        .route("/mcp", post(mcp_handler))
        .with_state(state)
}

/// Serve the HTTP transport until the listener fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<HttpState>,
) -> multiapi_common::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "HTTP transport listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// JSON observability: cache counters and remaining quota per category.
async fn stats_handler(State(state): State<Arc<HttpState>>) -> Json<Value> {
    let limiter = &state.app.rate_limiter;
    let rate_limits: BTreeMap<&str, Option<u32>> = limiter
        .categories()
        .into_iter()
        .map(|category| (category, limiter.remaining(category)))
        .collect();

    Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "cache": state.app.cache.stats(),
        "rate_limits": rate_limits,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Convenience listing: names, descriptions and required parameters.
async fn tools_handler(State(state): State<Arc<HttpState>>) -> Json<Value> {
    let tools: Vec<Value> = state
        .app
        .dispatcher
        .registry()
        .list()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "requiredParams": tool.input_schema.required,
            })
        })
        .collect();

    Json(json!({ "count": tools.len(), "tools": tools }))
}

/// POST /mcp: dispatch one envelope. The body is taken as raw bytes so that
/// malformed JSON, or a body that is not UTF-8, is still answered with an
/// envelope.
async fn mcp_handler(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("mcp_request", request_id = %request_id);

    let response = state
        .app
        .dispatcher
        .dispatch_bytes(&body)
        .instrument(span)
        .await;

    Json(response)
}
