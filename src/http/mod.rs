//! HTTP layer: axum router construction, shared state, and the
//! `BridgeError` -> HTTP response mapping (§6/§7).

pub mod health;
pub mod ingress;
pub mod stream;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;
use tower::limit::RequestBodyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::BridgeError;
use crate::streaming::chunked::ChunkedEngine;
use crate::streaming::sse::SseEngine;
use crate::supervisor::ProcessSupervisor;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ProcessSupervisor>,
    pub sse_engine: Arc<SseEngine>,
    pub chunked_engine: Arc<ChunkedEngine>,
    pub max_message_size: usize,
}

/// Build the full axum router. CORS is wide open per §6: the bridge expects
/// to sit behind an authenticating gateway.
pub fn build_router(state: AppState) -> axum::Router {
    let body_limit = state.max_message_size;
    axum::Router::new()
        .route("/", get(health::root))
        .route("/healthz", get(health::healthz))
        .route("/mcp", post(ingress::post_mcp))
        .route("/mcp/stream", get(stream::get_sse_stream))
        .route("/mcp/streamable", get(stream::get_chunked_stream))
        .route("/mcp/streamable", post(ingress::post_streamable))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// Maps each `BridgeError` variant to exactly one HTTP status, per the
/// table in §7.
impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::IngressBadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotRunning | BridgeError::CapacityExceeded(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BridgeError::ShutdownInProgress => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::ConfigInvalid(_)
            | BridgeError::ChildSpawnFailed { .. }
            | BridgeError::FrameParseError(_)
            | BridgeError::BufferOverrun { .. }
            | BridgeError::WriteFailure { .. }
            | BridgeError::Io(_)
            | BridgeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
