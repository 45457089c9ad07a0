//! Shared fixtures for integration tests: a temp `ToolSpec` file, a
//! tight-limits `BridgeConfig` builder, and a helper that boots a real
//! server on an ephemeral port.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mcp_bridge::config::{BridgeConfig, ToolSpec};
use mcp_bridge::http::build_router;
use mcp_bridge::Orchestrator;

/// Path to the `mcp_test_server` fixture binary built alongside this crate.
pub fn test_server_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mcp_test_server"))
}

/// A `BridgeConfig` pointed at the `mcp_test_server` fixture, with test-sized
/// limits so capacity/backpressure scenarios don't require huge payloads.
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        tool: ToolSpec {
            command: test_server_path().to_string_lossy().into_owned(),
            args: vec![],
            input_defaults: Default::default(),
        },
        port: 0,
        max_buffer_size: 4096,
        max_subscribers: 4,
        max_message_size: 16 * 1024,
        keepalive_interval: Duration::from_secs(30),
        stream_timeout: Duration::from_secs(60),
        restart_backoff_base: Duration::from_millis(20),
        restart_backoff_max: Duration::from_millis(500),
        lazy_start: false,
    }
}

/// Boot a real orchestrator and HTTP server on an ephemeral port, returning
/// the bound address and the orchestrator (the caller is responsible for
/// calling `orchestrator.shutdown()` when done).
pub async fn spawn_server(config: BridgeConfig) -> (SocketAddr, Orchestrator) {
    let orchestrator = Orchestrator::new(&config).await.expect("orchestrator construction");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let router = build_router(orchestrator.app_state());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    // Give the listener a moment to start accepting before the first request.
    tokio::time::sleep(Duration::from_millis(20)).await;

    (addr, orchestrator)
}
