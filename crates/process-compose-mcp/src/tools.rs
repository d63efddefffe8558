//! MCP Tool Types
//!
//! This module defines all MCP tool parameter and response types.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use process_compose_mcp_core::{ProcessRecord, ProcessStatus, SessionInfo};
use process_compose_mcp_session::{StartOptions, StopResult};

/// Parameters for tools that take none
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}

// =============================================================================
// Session Tools
// =============================================================================

/// Parameters for start_session
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StartSessionParams {
    /// Paths to process-compose YAML configs (default: process-compose.yaml)
    #[serde(default)]
    pub configs: Vec<String>,

    /// Paths to .env files (default: .env)
    #[serde(default)]
    pub env_files: Vec<String>,

    /// First API port to try; picked automatically when absent
    #[serde(default)]
    pub port: Option<u16>,

    /// Keep the project running after its processes exit (default: true)
    #[serde(default)]
    pub keep_project: Option<bool>,

    /// Serve the API on a Unix domain socket instead of TCP
    #[serde(default)]
    pub use_uds: bool,

    /// Socket path; defaults to <tmp>/process-compose-<pid>.sock
    #[serde(default)]
    pub uds_path: Option<String>,
}

impl From<StartSessionParams> for StartOptions {
    fn from(params: StartSessionParams) -> Self {
        Self {
            configs: params.configs,
            env_files: params.env_files,
            port: params.port,
            keep_project: params.keep_project,
            use_local_socket: params.use_uds,
            socket_path: params.uds_path.map(Into::into),
        }
    }
}

/// Response for stop_session
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StopSessionResponse {
    /// Supervisor stop outcome
    #[serde(flatten)]
    pub result: StopResult,

    /// Number of log follows cancelled
    pub follows_cancelled: usize,
}

/// Parameters for session_info
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfoParams {
    /// Lines of supervisor output to include (default: 20)
    #[serde(default = "default_output_lines")]
    pub output_lines: usize,
}

fn default_output_lines() -> usize {
    20
}

/// Response for session_info
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfoResponse {
    /// Session state (idle, launching, live)
    pub state: String,

    /// Live session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,

    /// Recent supervisor output
    pub recent_output: Vec<String>,

    /// Number of active log follows
    pub active_follows: usize,
}

// =============================================================================
// Project Tools
// =============================================================================

/// Parameters for status_summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusSummaryParams {
    /// Include memory usage in the project state
    #[serde(default)]
    pub with_memory: bool,
}

/// Response for status_summary
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusSummary {
    /// Process count per status
    pub counts: BTreeMap<String, usize>,

    /// Processes that are running, launched or restarting
    pub running: Vec<String>,

    /// Processes that failed, errored or are terminating
    pub failed_or_error: Vec<String>,

    /// Project state reported by the supervisor
    pub project: Value,
}

impl StatusSummary {
    /// Summarize a process snapshot alongside the project state.
    pub fn from_snapshot(records: &[ProcessRecord], project: Value) -> Self {
        let mut counts = BTreeMap::new();
        let mut running = Vec::new();
        let mut failed_or_error = Vec::new();

        for record in records {
            *counts.entry(record.status.as_str().to_string()).or_insert(0) += 1;

            let is_running = matches!(
                record.status,
                ProcessStatus::Running | ProcessStatus::Launched | ProcessStatus::Restarting
            );
            if record.is_running == Some(true) || is_running {
                running.push(record.name.clone());
            }

            let failed = match record.status {
                ProcessStatus::Completed => record.exit_code_or_zero() != 0,
                ProcessStatus::Error | ProcessStatus::Terminating => true,
                _ => false,
            };
            if failed {
                failed_or_error.push(record.name.clone());
            }
        }

        Self {
            counts,
            running,
            failed_or_error,
            project,
        }
    }
}

/// Response for project_info
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectInfoResponse {
    /// Project name, when the supervisor reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project state
    pub state: Value,
}

// =============================================================================
// Process Tools
// =============================================================================

/// Parameters for tools acting on one process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessNameParams {
    /// Process name
    pub name: String,
}

/// Parameters for tools acting on several processes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessNamesParams {
    /// Process names (at least one)
    pub names: Vec<String>,
}

/// Parameters for scale_process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScaleProcessParams {
    /// Process name
    pub name: String,

    /// Desired replica count
    pub replicas: u32,
}

/// Response for scale_process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScaleProcessResponse {
    /// Scaled process
    pub scaled: String,

    /// New replica count
    pub replicas: u32,
}

// =============================================================================
// Log Tools
// =============================================================================

/// Parameters for get_logs
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetLogsParams {
    /// Process name
    pub name: String,

    /// Lines to skip back from the end (default: 0)
    #[serde(default)]
    pub end_offset: u64,

    /// Maximum number of lines (default: 200)
    #[serde(default = "default_log_limit")]
    pub limit: u64,
}

fn default_log_limit() -> u64 {
    200
}

/// Log lines of one process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogLinesResponse {
    /// Process name
    pub name: String,

    /// Log lines, oldest first
    pub lines: Vec<String>,

    /// Number of lines
    pub count: usize,
}

impl LogLinesResponse {
    /// Wrap `lines` for `name`.
    pub fn new(name: String, lines: Vec<String>) -> Self {
        Self {
            name,
            count: lines.len(),
            lines,
        }
    }
}

/// Parameters for stream_logs
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StreamLogsParams {
    /// Process name
    pub name: String,

    /// Starting offset (default: 0)
    #[serde(default)]
    pub offset: u64,

    /// Stop after this many lines (default from config, 200)
    #[serde(default)]
    pub max_messages: Option<usize>,

    /// Stop after this many milliseconds (default from config, 3000)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Parameters for follow_logs_start
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowLogsParams {
    /// Process name
    pub name: String,

    /// Starting offset (default: 0)
    #[serde(default)]
    pub offset: u64,
}

/// Response for follow_logs_start
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowLogsResponse {
    /// Identifier used to stop the follow
    pub follow_id: String,

    /// Followed process
    pub name: String,

    /// How lines are delivered
    pub message: String,
}

/// Parameters for follow_logs_stop
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowStopParams {
    /// Identifier returned by follow_logs_start
    pub follow_id: String,
}

/// Response for follow_logs_stop
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowStopResponse {
    /// Follow identifier
    pub follow_id: String,

    /// Whether a running follow was cancelled
    pub stopped: bool,
}

// =============================================================================
// Readiness Tools
// =============================================================================

/// Parameters for await_ready
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AwaitReadyParams {
    /// Processes to wait for; every process when absent
    #[serde(default)]
    pub names: Option<Vec<String>>,

    /// Overall wait in milliseconds (default from config, 30000)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Poll interval in milliseconds (default from config, 500)
    #[serde(default)]
    pub interval_ms: Option<u64>,
}
