//! mcp-bridge - JSON-RPC-over-stdio to HTTP transport adapter
//!
//! Exposes a locally spawned JSON-RPC child process (newline-delimited JSON
//! over stdin/stdout) as a remotely reachable HTTP service: clients POST
//! JSON-RPC messages to an ingress endpoint and receive server-originated
//! messages over one of two long-lived streaming egress transports
//! (Server-Sent Events, or chunked newline-delimited JSON).
//!
//! # Architecture
//!
//! - `supervisor`: spawns, monitors, and restarts the child process with
//!   exponential backoff; owns its stdin for writes.
//! - `framing`: splits raw stdout byte chunks into complete JSON-RPC text
//!   frames.
//! - `envelope`: JSON-RPC 2.0 envelope classification and validation.
//! - `router`: pulls frames from the Frame Splitter and broadcasts valid
//!   ones to both Subscriber Engines.
//! - `streaming`: the two Subscriber Engines (event-stream, chunked-ndjson)
//!   and their shared bounded-buffering/backpressure/eviction core.
//! - `http`: axum router, ingress handler, streaming handlers, health
//!   endpoint.
//! - `lifecycle`: wires everything together and sequences startup/shutdown.
//! - `config`: environment-driven configuration and `ToolSpec` loading.
//! - `error`: the crate-wide error type.
//! - `cli`: command-line overrides for the binary entry point.

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod http;
pub mod lifecycle;
pub mod router;
pub mod streaming;
pub mod supervisor;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use lifecycle::Orchestrator;
