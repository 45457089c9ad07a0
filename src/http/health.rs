//! `GET /healthz` and `GET /` (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::AppState;

const DEGRADED_RESTART_THRESHOLD: u32 = 5;

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let process = state.supervisor.state().await;

    let status = if !process.running && process.restart_count > 0 {
        "unhealthy"
    } else if process.restart_count > DEGRADED_RESTART_THRESHOLD {
        "degraded"
    } else {
        "healthy"
    };

    let http_status = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "process": {
            "running": process.running,
            "pid": process.pid,
            "restartCount": process.restart_count,
        },
        "subscribers": {
            "sse": state.sse_engine.subscriber_count().await,
            "streamableHttp": state.chunked_engine.subscriber_count().await,
        }
    });

    (http_status, Json(body))
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "mcp-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /healthz",
            "POST /mcp",
            "GET /mcp/stream",
            "GET /mcp/streamable",
            "POST /mcp/streamable",
        ],
    }))
}
