//! # process-compose-mcp-session
//!
//! Lifecycle management of the external process-compose supervisor.
//!
//! This crate provides:
//! - Binary lookup, API port probing and launch arguments
//! - The session state machine (idle, launching, live)
//! - Bounded capture of supervisor output
//! - Readiness polling over the control API
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on process-compose-mcp-core,
//! process-compose-mcp-client and process-compose-mcp-analysis.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod launch;
pub mod manager;
pub mod output;
pub mod ready;

// Re-export commonly used types
pub use manager::{SessionManager, SessionState, StartOptions, StopResult};
pub use output::OutputTail;
pub use ready::{await_ready, ReadyCondition, ReadyResult};
