//! `GET /mcp/stream` and `GET /mcp/streamable` (§6): attach a new
//! subscriber to the matching Subscriber Engine and stream its frames as
//! the HTTP response body.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::Result;

use super::AppState;

pub async fn get_sse_stream(State(state): State<AppState>) -> Result<Response> {
    let stream = state.sse_engine.attach().await?;
    let body = Body::from_stream(ReceiverStream::new(stream.receiver).map(Ok::<_, std::io::Error>));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(body)
        .expect("static headers are always valid"))
}

pub async fn get_chunked_stream(State(state): State<AppState>) -> Result<Response> {
    Ok(chunked_response(&state).await?.into_response())
}

/// Shared with `POST /mcp/streamable`'s inbound-and-upgrade mode.
pub async fn chunked_response(state: &AppState) -> Result<Response> {
    let stream = state.chunked_engine.attach().await?;
    let body = Body::from_stream(ReceiverStream::new(stream.receiver).map(Ok::<_, std::io::Error>));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .expect("static headers are always valid"))
}
