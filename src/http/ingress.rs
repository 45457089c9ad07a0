//! Ingress Handler (§4.5): `POST /mcp` and `POST /mcp/streamable`.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::envelope::{normalize_body, to_frame_line};
use crate::error::{BridgeError, Result};

use super::stream::chunked_response;
use super::AppState;

/// `POST /mcp`: relay only, never upgrades to a stream.
pub async fn post_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let message_count = relay(&state, &headers, &body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "messageCount": message_count })),
    ))
}

/// `POST /mcp/streamable`: relay, then optionally upgrade the same
/// response into a chunked-ndjson subscriber if the client asked for it via
/// `?stream=true` or `X-MCP-Stream: true` (§4.5 inbound-and-upgrade mode).
pub async fn post_streamable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<axum::response::Response> {
    let message_count = relay(&state, &headers, &body).await?;

    let wants_stream = query.get("stream").map(|v| v == "true").unwrap_or(false)
        || headers
            .get("x-mcp-stream")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

    if wants_stream {
        return Ok(chunked_response(&state).await?.into_response());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "messageCount": message_count })),
    )
        .into_response())
}

async fn relay(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<usize> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        return Err(BridgeError::IngressBadRequest(format!(
            "unsupported Content-Type: {content_type}"
        )));
    }

    if body.len() > state.max_message_size {
        return Err(BridgeError::IngressBadRequest(format!(
            "body of {} bytes exceeds maxMessageSize of {}",
            body.len(),
            state.max_message_size
        )));
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| BridgeError::IngressBadRequest(format!("invalid JSON body: {e}")))?;

    let elements = normalize_body(value).map_err(BridgeError::IngressBadRequest)?;

    for element in &elements {
        let frame = to_frame_line(element)?;
        state.supervisor.write(frame).await?;
    }

    Ok(elements.len())
}
