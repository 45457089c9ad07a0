//! Subscriber Engine core (§4.3)
//!
//! [`EngineCore`] holds the bookkeeping shared by both egress flavors: the
//! subscriber map, per-subscriber bounded queues, flush/backpressure, and
//! eviction. [`sse`] and [`chunked`] wrap it with their distinct on-wire
//! framing, keepalive, and replay behavior.

pub mod chunked;
pub mod sse;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// Outbound channel capacity, in frames, between a subscriber's flush loop
/// and its HTTP response body stream. This is independent of `maxBufferSize`
/// (a byte ceiling on the logical queue); it just bounds how far the flush
/// loop can run ahead of the body stream actually being polled.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

struct SubscriberQueue {
    frames: VecDeque<Bytes>,
    queued_bytes: usize,
    flushing: bool,
}

/// One open streaming connection, owned by an `EngineCore`.
pub struct Subscriber {
    id: String,
    #[allow(dead_code)]
    connected_at: DateTime<Utc>,
    last_activity_at: Mutex<DateTime<Utc>>,
    tx: mpsc::Sender<Bytes>,
    queue: Mutex<SubscriberQueue>,
}

impl Subscriber {
    /// Current `queuedBytes` invariant value, for tests and diagnostics.
    pub async fn queued_bytes(&self) -> usize {
        self.queue.lock().await.queued_bytes
    }
}

/// Byte-stream side of a freshly attached subscriber, handed to the HTTP
/// layer to build a streaming response body.
pub struct AttachedStream {
    pub id: String,
    pub receiver: mpsc::Receiver<Bytes>,
}

/// Shared bookkeeping for a set of subscribers of one wire format.
pub struct EngineCore {
    subscribers: Mutex<HashMap<String, Arc<Subscriber>>>,
    max_subscribers: usize,
    max_buffer_size: usize,
    /// Published on every insertion/removal so engine-specific logic (e.g.
    /// the SSE keepalive ticker) can react to count transitions
    /// deterministically instead of polling `len()`.
    count_tx: watch::Sender<usize>,
}

impl EngineCore {
    pub fn new(max_subscribers: usize, max_buffer_size: usize) -> Self {
        let (count_tx, _count_rx) = watch::channel(0);
        Self {
            subscribers: Mutex::new(HashMap::new()),
            max_subscribers,
            max_buffer_size,
            count_tx,
        }
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Subscribe to subscriber-count transitions. The current count is
    /// always available via `*receiver.borrow()` without waiting for a
    /// change.
    pub fn watch_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Reserve a slot and create the subscriber record. Does not send any
    /// bytes; callers write opening/replay/sentinel frames before or after
    /// this returns as their framing requires.
    pub async fn attach(self: &Arc<Self>) -> Result<(Arc<Subscriber>, AttachedStream)> {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.len() >= self.max_subscribers {
            return Err(BridgeError::CapacityExceeded(format!(
                "{} subscribers already attached",
                subscribers.len()
            )));
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let subscriber = Arc::new(Subscriber {
            id: id.clone(),
            connected_at: Utc::now(),
            last_activity_at: Mutex::new(Utc::now()),
            tx,
            queue: Mutex::new(SubscriberQueue {
                frames: VecDeque::new(),
                queued_bytes: 0,
                flushing: false,
            }),
        });
        subscribers.insert(id.clone(), Arc::clone(&subscriber));
        let _ = self.count_tx.send(subscribers.len());
        drop(subscribers);

        Ok((
            subscriber,
            AttachedStream {
                id,
                receiver: rx,
            },
        ))
    }

    /// Enqueue `bytes` for every currently attached subscriber and kick off
    /// a flush for each. Subscribers that would overrun their byte ceiling
    /// are evicted instead of receiving the frame.
    pub async fn broadcast(self: &Arc<Self>, bytes: Bytes) {
        let targets: Vec<Arc<Subscriber>> = self.subscribers.lock().await.values().cloned().collect();
        for subscriber in targets {
            self.enqueue_and_flush(subscriber, bytes.clone()).await;
        }
    }

    /// Directly deliver `bytes` to one subscriber (used for opening/replay/
    /// sentinel frames written at attach time, before the first broadcast).
    pub async fn deliver_to(self: &Arc<Self>, subscriber: &Arc<Subscriber>, bytes: Bytes) {
        self.enqueue_and_flush(Arc::clone(subscriber), bytes).await;
    }

    async fn enqueue_and_flush(self: &Arc<Self>, subscriber: Arc<Subscriber>, bytes: Bytes) {
        let should_flush = {
            let mut queue = subscriber.queue.lock().await;
            if queue.queued_bytes + bytes.len() > self.max_buffer_size {
                tracing::warn!(
                    target: "mcp_bridge::streaming",
                    "subscriber {} buffer overrun, evicting",
                    subscriber.id
                );
                drop(queue);
                self.evict(&subscriber.id).await;
                return;
            }
            queue.queued_bytes += bytes.len();
            queue.frames.push_back(bytes);
            let should_flush = !queue.flushing;
            queue.flushing = true;
            should_flush
        };

        if should_flush {
            let core = Arc::clone(self);
            tokio::spawn(async move {
                core.flush(subscriber).await;
            });
        }
    }

    async fn flush(self: Arc<Self>, subscriber: Arc<Subscriber>) {
        loop {
            let next = {
                let mut queue = subscriber.queue.lock().await;
                match queue.frames.pop_front() {
                    Some(frame) => Some(frame),
                    None => {
                        queue.flushing = false;
                        None
                    }
                }
            };

            let Some(frame) = next else { break };
            let frame_len = frame.len();

            // `send` backpressures here until the HTTP body stream drains,
            // which is exactly the suspend/resume-on-drain behavior §4.3
            // calls for.
            if subscriber.tx.send(frame).await.is_err() {
                self.evict(&subscriber.id).await;
                return;
            }

            let mut queue = subscriber.queue.lock().await;
            queue.queued_bytes = queue.queued_bytes.saturating_sub(frame_len);
            drop(queue);
            *subscriber.last_activity_at.lock().await = Utc::now();
        }
    }

    /// Remove and drop a subscriber, closing its sink.
    pub async fn evict(&self, id: &str) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.remove(id);
        let _ = self.count_tx.send(subscribers.len());
    }

    /// Best-effort close of every subscriber, e.g. on shutdown.
    pub async fn close_all(&self) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.clear();
        let _ = self.count_tx.send(0);
    }
}
