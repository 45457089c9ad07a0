//! Event-stream (SSE-flavored) Subscriber Engine.
//!
//! No replay buffer: a subscriber that attaches late simply starts from the
//! next broadcast (§9 design notes — the asymmetry with the chunked-ndjson
//! engine is intentional).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::streaming::{AttachedStream, EngineCore};

const OPENING_COMMENT: &[u8] = b": stream opened\n\n";
const KEEPALIVE_COMMENT: &[u8] = b": keepalive\n\n";

/// The event-stream (`text/event-stream`) Subscriber Engine.
///
/// The keepalive ticker is owned by a single long-lived manager task
/// (spawned once, on the first attach) that watches `EngineCore`'s
/// subscriber count and starts/stops the ticker on every 0<->1 transition.
/// Routing the transition through a `watch` channel rather than having
/// `attach`/`evict` each decide locally avoids the race where a subscriber
/// disconnects and a new one reattaches within one keepalive interval: the
/// old ticker would otherwise still be alive (only self-exiting lazily on
/// its next tick) when a second one got spawned on top of it.
pub struct SseEngine {
    core: Arc<EngineCore>,
    keepalive_interval: Duration,
    keepalive_manager_started: AtomicBool,
}

impl SseEngine {
    pub fn new(max_subscribers: usize, max_buffer_size: usize, keepalive_interval: Duration) -> Self {
        Self {
            core: Arc::new(EngineCore::new(max_subscribers, max_buffer_size)),
            keepalive_interval,
            keepalive_manager_started: AtomicBool::new(false),
        }
    }

    /// Attach a new subscriber: writes the opening comment frame and
    /// registers it. Ensures the keepalive manager task is running (a
    /// no-op after the first call).
    pub async fn attach(self: &Arc<Self>) -> Result<AttachedStream> {
        self.ensure_keepalive_manager();

        let (subscriber, stream) = self.core.attach().await?;
        self.core
            .deliver_to(&subscriber, Bytes::from_static(OPENING_COMMENT))
            .await;

        Ok(stream)
    }

    /// Render and broadcast one JSON-RPC frame as `data: <frame>\n\n`.
    pub async fn broadcast(&self, frame: &str) {
        let mut payload = format!("data: {frame}\n\n").into_bytes();
        payload.shrink_to_fit();
        self.core.broadcast(Bytes::from(payload)).await;
    }

    /// Close every subscriber, e.g. during orchestrator shutdown. The
    /// keepalive manager observes the resulting 1->0 transition and stops
    /// its ticker on its own; nothing further to do here.
    pub async fn close_all(&self) {
        self.core.close_all().await;
    }

    /// Number of currently attached subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.core.len().await
    }

    /// Spawn the keepalive manager task exactly once per engine. Later
    /// calls (from subsequent attaches) are a no-op; the manager task lives
    /// for the engine's whole lifetime and reacts to every subscriber-count
    /// transition via `EngineCore`'s `watch` channel rather than being
    /// re-spawned per attach.
    fn ensure_keepalive_manager(self: &Arc<Self>) {
        if self.keepalive_manager_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut count_rx = engine.core.watch_count();
            let mut ticker_handle: Option<JoinHandle<()>> = None;

            loop {
                let count = *count_rx.borrow();
                match (count, ticker_handle.is_some()) {
                    (0, true) => {
                        if let Some(handle) = ticker_handle.take() {
                            handle.abort();
                        }
                    }
                    (n, false) if n >= 1 => {
                        let core = Arc::clone(&engine.core);
                        let interval = engine.keepalive_interval;
                        ticker_handle = Some(tokio::spawn(async move {
                            let mut ticker = tokio::time::interval(interval);
                            ticker.tick().await; // first tick fires immediately; skip it
                            loop {
                                ticker.tick().await;
                                core.broadcast(Bytes::from_static(KEEPALIVE_COMMENT)).await;
                            }
                        }));
                    }
                    _ => {}
                }

                if count_rx.changed().await.is_err() {
                    break; // EngineCore dropped; the engine itself is gone.
                }
            }

            if let Some(handle) = ticker_handle.take() {
                handle.abort();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_writes_opening_comment() {
        let engine = Arc::new(SseEngine::new(4, 1024, Duration::from_secs(30)));
        let mut stream = engine.attach().await.unwrap();
        let first = stream.receiver.recv().await.unwrap();
        assert_eq!(&first[..], OPENING_COMMENT);
    }

    #[tokio::test]
    async fn test_broadcast_renders_data_frame() {
        let engine = Arc::new(SseEngine::new(4, 1024, Duration::from_secs(30)));
        let mut stream = engine.attach().await.unwrap();
        let _opening = stream.receiver.recv().await.unwrap();

        engine.broadcast(r#"{"jsonrpc":"2.0","method":"x"}"#).await;
        let rendered = stream.receiver.recv().await.unwrap();
        assert_eq!(
            &rendered[..],
            b"data: {\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n\n".as_slice()
        );
    }

    #[tokio::test]
    async fn test_late_attach_receives_no_replay() {
        let engine = Arc::new(SseEngine::new(4, 1024, Duration::from_secs(30)));
        engine.broadcast("dropped, nobody listening").await;

        let mut stream = engine.attach().await.unwrap();
        let opening = stream.receiver.recv().await.unwrap();
        assert_eq!(&opening[..], OPENING_COMMENT);

        engine.broadcast("seen").await;
        let next = stream.receiver.recv().await.unwrap();
        assert!(String::from_utf8_lossy(&next).contains("seen"));
    }

    #[tokio::test]
    async fn test_reattach_within_keepalive_interval_does_not_duplicate_ticker() {
        let interval = Duration::from_millis(25);
        let engine = Arc::new(SseEngine::new(4, 1024, interval));

        let mut first = engine.attach().await.unwrap();
        let _opening = first.receiver.recv().await.unwrap();

        // Give the keepalive manager time to observe count=1 and start its
        // ticker before the evict/reattach race below.
        tokio::time::sleep(interval * 2).await;

        // Evict and immediately reattach, with no delay between them: this
        // is the race that used to spawn a second, orphaned ticker.
        engine.core.evict(&first.id).await;
        let mut second = engine.attach().await.unwrap();
        let _opening = second.receiver.recv().await.unwrap();

        tokio::time::sleep(interval * 12).await;

        let mut keepalive_count = 0;
        while let Ok(frame) = second.receiver.try_recv() {
            if &frame[..] == KEEPALIVE_COMMENT {
                keepalive_count += 1;
            }
        }

        // A single ticker emits roughly one keepalive per interval; a
        // duplicated, un-abortable ticker roughly doubles that rate.
        assert!(
            keepalive_count <= 16,
            "expected a single keepalive ticker, saw {keepalive_count} frames \
             suggesting a duplicated ticker"
        );
    }
}
