//! # process-compose-mcp-analysis
//!
//! Readiness classification for process-compose process state.
//!
//! Turns a snapshot of [`ProcessRecord`]s into a readiness verdict per
//! process and a categorized [`Analysis`]. Everything here is pure: no I/O,
//! no state, one pass over the input.
//!
//! ## Architecture
//!
//! This is Layer 1 - it depends only on process-compose-mcp-core.
//!
//! [`ProcessRecord`]: process_compose_mcp_core::ProcessRecord

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod readiness;

pub use classify::{classify, AnalyzedProcess, Analysis, FailedProcess, FlaggedProcess};
pub use readiness::{evaluate, Readiness};
