//! # process-compose-mcp-client
//!
//! Client for the process-compose control API.
//!
//! This crate provides:
//! - Request/response transport over TCP (reqwest) or a Unix domain socket
//! - Typed control-API operations and liveness polling
//! - Bounded log-stream windows and cancellable log following over WebSocket
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on process-compose-mcp-core
//! and knows nothing about how the supervisor process is launched.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
#[cfg(unix)]
mod http1;
pub mod logs;
pub mod transport;

// Re-export commonly used types
pub use client::{ProcessComposeClient, ProcessPorts, DEFAULT_LIVE_POLL_INTERVAL, DEFAULT_TIMEOUT};
pub use logs::{follow, stream, FollowSettings, LogStreamRequest, LogWindow};
pub use transport::{RawResponse, Transport};
