//! Chunked-ndjson Subscriber Engine.
//!
//! Adds a replay buffer (populated only while no subscriber is attached,
//! drained into the first subsequent attach) and the synthetic force-flush
//! sentinel described in §4.3/§9.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::streaming::{AttachedStream, EngineCore};

/// The synthetic frame written on attach, solely to force the HTTP layer to
/// flush response headers, when replay left the new subscriber's queue
/// empty. Not a real JSON-RPC message; callers should not forward it.
pub const FORCE_FLUSH_SENTINEL: &str = r#"{"jsonrpc":"2.0","method":"_stream_opened"}"#;

struct ReplayBuffer {
    frames: VecDeque<Bytes>,
    bytes: usize,
    max_bytes: usize,
}

impl ReplayBuffer {
    fn new(max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    fn push(&mut self, frame: Bytes) {
        if self.bytes + frame.len() > self.max_bytes {
            tracing::warn!(
                target: "mcp_bridge::streaming::chunked",
                "replay buffer full, dropping frame"
            );
            return;
        }
        self.bytes += frame.len();
        self.frames.push_back(frame);
    }

    fn drain(&mut self) -> Vec<Bytes> {
        self.bytes = 0;
        self.frames.drain(..).collect()
    }
}

/// The chunked newline-delimited-JSON Subscriber Engine.
pub struct ChunkedEngine {
    core: Arc<EngineCore>,
    replay: Mutex<ReplayBuffer>,
    max_buffer_size: usize,
}

impl ChunkedEngine {
    pub fn new(max_subscribers: usize, max_buffer_size: usize) -> Self {
        Self {
            core: Arc::new(EngineCore::new(max_subscribers, max_buffer_size)),
            replay: Mutex::new(ReplayBuffer::new(max_buffer_size)),
            max_buffer_size,
        }
    }

    /// Attach a new subscriber: registers it, transfers any replayed
    /// frames into its queue, and writes the force-flush sentinel iff the
    /// queue is still empty afterward.
    pub async fn attach(self: &Arc<Self>) -> Result<AttachedStream> {
        let (subscriber, stream) = self.core.attach().await?;

        let replayed = self.replay.lock().await.drain();
        let mut delivered_any = false;
        let mut budget = self.max_buffer_size;
        for frame in replayed {
            if frame.len() > budget {
                tracing::warn!(
                    target: "mcp_bridge::streaming::chunked",
                    "dropping replayed frame exceeding subscriber buffer ceiling"
                );
                continue;
            }
            budget -= frame.len();
            self.core.deliver_to(&subscriber, frame).await;
            delivered_any = true;
        }

        if !delivered_any {
            self.core
                .deliver_to(&subscriber, encode(FORCE_FLUSH_SENTINEL))
                .await;
        }

        Ok(stream)
    }

    /// Render and broadcast one JSON-RPC frame as `<frame>\n`. While no
    /// subscriber is attached, the frame is appended to the replay buffer
    /// instead of being dropped.
    pub async fn broadcast(self: &Arc<Self>, frame: &str) {
        if self.core.len().await == 0 {
            self.replay.lock().await.push(encode(frame));
            return;
        }
        self.core.broadcast(encode(frame)).await;
    }

    /// Close every subscriber, e.g. during orchestrator shutdown.
    pub async fn close_all(&self) {
        self.core.close_all().await;
    }

    /// Number of currently attached subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.core.len().await
    }
}

fn encode(frame: &str) -> Bytes {
    let mut line = String::with_capacity(frame.len() + 1);
    line.push_str(frame);
    line.push('\n');
    Bytes::from(line.into_bytes())
}
