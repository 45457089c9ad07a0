//! Lifecycle Orchestrator (§4.6): wires the Process Supervisor, Message
//! Router, and both Subscriber Engines together, applies the lazy-start
//! policy, and sequences graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::http::AppState;
use crate::router;
use crate::streaming::chunked::ChunkedEngine;
use crate::streaming::sse::SseEngine;
use crate::supervisor::ProcessSupervisor;

/// Owns every long-lived component for one run of the bridge.
pub struct Orchestrator {
    supervisor: Arc<ProcessSupervisor>,
    sse_engine: Arc<SseEngine>,
    chunked_engine: Arc<ChunkedEngine>,
    router_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
    max_message_size: usize,
    pub port: u16,
}

impl Orchestrator {
    /// Construct every component from a validated [`BridgeConfig`], start
    /// the Message Router, and eagerly start the child unless `lazyStart`
    /// is set.
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        let (stdout_tx, stdout_rx) = tokio::sync::mpsc::unbounded_channel();
        let (stderr_tx, mut stderr_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        // The supervisor already logs each stderr line at DEBUG as it reads
        // it; this task just drains the channel so it cannot grow unbounded.
        tokio::spawn(async move { while stderr_rx.recv().await.is_some() {} });

        let supervisor = Arc::new(ProcessSupervisor::new(
            config.tool.command.clone(),
            config.tool.args.clone(),
            config.restart_backoff_base,
            config.restart_backoff_max,
            config.lazy_start,
            stdout_tx,
            stderr_tx,
        ));

        let sse_engine = Arc::new(SseEngine::new(
            config.max_subscribers,
            config.max_buffer_size,
            config.keepalive_interval,
        ));
        let chunked_engine = Arc::new(ChunkedEngine::new(config.max_subscribers, config.max_buffer_size));

        let router_handle = tokio::spawn(router::run(
            stdout_rx,
            Arc::clone(&sse_engine),
            Arc::clone(&chunked_engine),
        ));

        if !config.lazy_start {
            supervisor.start().await?;
        }

        Ok(Self {
            supervisor,
            sse_engine,
            chunked_engine,
            router_handle: Mutex::new(Some(router_handle)),
            shutdown_started: AtomicBool::new(false),
            max_message_size: config.max_message_size,
            port: config.port,
        })
    }

    /// Shared state for the HTTP router.
    pub fn app_state(&self) -> AppState {
        AppState {
            supervisor: Arc::clone(&self.supervisor),
            sse_engine: Arc::clone(&self.sse_engine),
            chunked_engine: Arc::clone(&self.chunked_engine),
            max_message_size: self.max_message_size,
        }
    }

    /// Begin graceful shutdown: close every subscriber, stop the child, and
    /// let the Message Router exit once the stdout channel closes.
    /// Idempotent on repeated calls (§4.6).
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::ShutdownInProgress);
        }

        self.sse_engine.close_all().await;
        self.chunked_engine.close_all().await;
        self.supervisor.stop().await?;

        if let Some(handle) = self.router_handle.lock().await.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
        }

        Ok(())
    }
}
