//! Error types for the MCP bridge
//!
//! This module defines all error types used throughout the bridge, using
//! `thiserror` for ergonomic error handling. Every failure kind in the
//! error-handling design has exactly one variant here so that the HTTP layer
//! can map errors to status codes with a single exhaustive `match`.

use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration could not be loaded or failed validation. Fatal at startup.
    #[error("configuration error: {0}")]
    ConfigInvalid(String),

    /// The child process could not be spawned.
    #[error("failed to spawn child process `{command}`: {message}")]
    ChildSpawnFailed {
        /// Executable that failed to spawn
        command: String,
        /// Underlying OS error text
        message: String,
    },

    /// The supervisor has no live child and lazy-start is disabled.
    #[error("child process is not running")]
    NotRunning,

    /// A frame could not be parsed as a JSON-RPC envelope.
    #[error("frame parse error: {0}")]
    FrameParseError(String),

    /// An inbound HTTP request violated the ingress contract.
    #[error("bad request: {0}")]
    IngressBadRequest(String),

    /// A subscriber engine is at its subscriber-count ceiling.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A subscriber's queue would exceed its byte ceiling.
    #[error("buffer overrun for subscriber {subscriber_id}")]
    BufferOverrun {
        /// The evicted subscriber's id
        subscriber_id: String,
    },

    /// Writing to a subscriber's sink failed.
    #[error("write failure for subscriber {subscriber_id}: {message}")]
    WriteFailure {
        /// The affected subscriber's id
        subscriber_id: String,
        /// Underlying I/O error text
        message: String,
    },

    /// Graceful shutdown was already initiated; further calls are no-ops.
    #[error("shutdown already in progress")]
    ShutdownInProgress,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for bridge operations.
///
/// Unlike a CLI application that only needs rich context at the top level,
/// every caller here needs to match on the concrete error kind (e.g. the HTTP
/// layer maps `BridgeError::CapacityExceeded` to a 503), so the alias wraps
/// `BridgeError` directly rather than `anyhow::Error`.
pub type Result<T> = std::result::Result<T, BridgeError>;
