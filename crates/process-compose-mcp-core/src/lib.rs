//! # process-compose-mcp-core
//!
//! Core types for the process-compose MCP server.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other process-compose-mcp crates. It provides:
//!
//! - Process types (ProcessRecord, ProcessStatus) and the ingestion adapter
//! - Session types (SessionInfo, Endpoint)
//! - Configuration loaded from YAML
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other process-compose-mcp crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod process;
pub mod session;

// Re-export commonly used types
pub use config::{
    ClientSettings, LogSettings, ReadinessSettings, ServerConfig, ServerSettings,
    SupervisorSettings,
};
pub use error::{Error, Result};
pub use process::{first_present, ProcessRecord, ProcessStatus};
pub use session::{Endpoint, SessionInfo};
