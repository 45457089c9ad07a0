//! Message Router (§4.4)
//!
//! Stateless glue: pulls raw stdout chunks, frames them, validates each
//! frame as a JSON-RPC envelope, and broadcasts the valid ones to both
//! Subscriber Engines. Parse failures are logged and skipped; they never
//! interrupt the pipeline.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::envelope::validate_envelope;
use crate::framing::FrameSplitter;
use crate::streaming::chunked::ChunkedEngine;
use crate::streaming::sse::SseEngine;

/// Drives the stdout-chunk -> frame -> broadcast pipeline until the chunk
/// channel closes (i.e. the supervisor's stdout reader task has ended).
pub async fn run(
    mut stdout_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    sse_engine: Arc<SseEngine>,
    chunked_engine: Arc<ChunkedEngine>,
) {
    let mut splitter = FrameSplitter::new();

    while let Some(chunk) = stdout_rx.recv().await {
        for frame in splitter.push_chunk(&chunk) {
            let value: serde_json::Value = match serde_json::from_str(&frame) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        target: "mcp_bridge::router",
                        "dropping unparseable line from child stdout: {e}; raw={frame}"
                    );
                    continue;
                }
            };

            if let Err(reason) = validate_envelope(&value) {
                tracing::warn!(
                    target: "mcp_bridge::router",
                    "dropping invalid envelope from child stdout: {reason}; raw={frame}"
                );
                continue;
            }

            let canonical = match serde_json::to_string(&value) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "mcp_bridge::router", "re-serialization failed: {e}");
                    continue;
                }
            };

            sse_engine.broadcast(&canonical).await;
            chunked_engine.broadcast(&canonical).await;
        }
    }

    tracing::info!(target: "mcp_bridge::router", "stdout channel closed, router exiting");
}
