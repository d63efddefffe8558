//! Error types for the process-compose MCP server.

use thiserror::Error;

/// Main error type for process-compose MCP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation needs a live session but none exists
    #[error("No active session. Call start_session first.")]
    NoActiveSession,

    /// A session is already launching or live
    #[error("Session already running")]
    AlreadyRunning,

    /// Port probing exhausted its attempts
    #[error("No free port found for process-compose API (tried {attempts} ports from {base})")]
    NoFreePort {
        /// First port probed
        base: u16,
        /// Number of ports probed
        attempts: u16,
    },

    /// Supervisor did not become live within the launch budget
    #[error("process-compose did not become live within {timeout_ms}ms. Recent output:\n{output}")]
    LaunchTimeout {
        /// Launch budget in milliseconds
        timeout_ms: u64,
        /// Tail of captured stdout/stderr
        output: String,
    },

    /// Supervisor exited before becoming live
    #[error("process-compose exited before becoming live ({status}). Recent output:\n{output}")]
    LaunchFailed {
        /// Exit status description
        status: String,
        /// Tail of captured stdout/stderr
        output: String,
    },

    /// Liveness check never succeeded
    #[error("process-compose API did not become live within {0}ms")]
    NotLive(u64),

    /// Non-success response from the control API
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Status text or response body
        message: String,
    },

    /// A single request exceeded its budget
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Log stream errored before closing cleanly
    #[error("Log stream error: {0}")]
    Stream(String),

    /// Invalid input or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
