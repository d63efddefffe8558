//! Categorization of a process snapshot.

use std::collections::BTreeMap;

use process_compose_mcp_core::{ProcessRecord, ProcessStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::readiness::{evaluate, HEALTH_NOT_APPLICABLE};

/// A process that completed with a non-zero exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedProcess {
    /// Process name
    pub name: String,
    /// Exit code
    pub exit_code: i64,
    /// Readiness reason, or "non-zero exit"
    pub reason: String,
}

/// A process flagged with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FlaggedProcess {
    /// Process name
    pub name: String,
    /// Why the process was flagged
    pub reason: String,
}

/// Per-process diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedProcess {
    /// Process name
    pub name: String,
    /// Raw status
    pub status: String,
    /// Exit code, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    /// Normalized health ("-" when absent)
    pub health: String,
    /// Whether a readiness probe is configured
    pub has_health_probe: bool,
    /// Advisory running flag, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    /// Readiness reason
    pub reason: String,
    /// Readiness verdict
    pub ready: bool,
}

/// Categorized view of a process snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Analysis {
    /// Count per raw status
    pub summary: BTreeMap<String, usize>,
    /// Running or launched
    pub running: Vec<String>,
    /// Restarting
    pub restarting: Vec<String>,
    /// Completed with exit code 0
    pub completed_ok: Vec<String>,
    /// Completed with a non-zero exit code
    pub failed: Vec<FailedProcess>,
    /// In error state
    pub error: Vec<FlaggedProcess>,
    /// Waiting to start
    pub pending: Vec<FlaggedProcess>,
    /// Disabled
    pub disabled: Vec<String>,
    /// Foreground
    pub foreground: Vec<String>,
    /// Any other status
    pub other: Vec<String>,
    /// Every process whose verdict is not ready
    pub not_ready: Vec<FlaggedProcess>,
    /// One diagnostic per input record
    pub details: Vec<AnalyzedProcess>,
}

impl Analysis {
    /// Whether every analyzed process is ready.
    pub fn all_ready(&self) -> bool {
        self.not_ready.is_empty()
    }
}

fn or_default(reason: &str, fallback: &str) -> String {
    if reason.is_empty() {
        fallback.to_string()
    } else {
        reason.to_string()
    }
}

/// Classify a process snapshot.
///
/// Each record lands in exactly one status bucket; not-ready records are
/// also listed in `not_ready`, and every record gets a `details` entry.
pub fn classify(records: &[ProcessRecord]) -> Analysis {
    let mut analysis = Analysis::default();

    for record in records {
        *analysis
            .summary
            .entry(record.status.as_str().to_string())
            .or_insert(0) += 1;

        let verdict = evaluate(record);
        let name = record.name.clone();

        analysis.details.push(AnalyzedProcess {
            name: name.clone(),
            status: record.status.as_str().to_string(),
            exit_code: record.exit_code,
            health: record
                .health
                .clone()
                .unwrap_or_else(|| HEALTH_NOT_APPLICABLE.to_string()),
            has_health_probe: record.has_probe(),
            is_running: record.is_running,
            reason: verdict.reason.clone(),
            ready: verdict.ready,
        });

        match record.status {
            ProcessStatus::Running | ProcessStatus::Launched => {
                analysis.running.push(name.clone())
            }
            ProcessStatus::Restarting => analysis.restarting.push(name.clone()),
            ProcessStatus::Completed => {
                let exit_code = record.exit_code_or_zero();
                if exit_code == 0 {
                    analysis.completed_ok.push(name.clone());
                } else {
                    analysis.failed.push(FailedProcess {
                        name: name.clone(),
                        exit_code,
                        reason: or_default(&verdict.reason, "non-zero exit"),
                    });
                }
            }
            ProcessStatus::Error => analysis.error.push(FlaggedProcess {
                name: name.clone(),
                reason: or_default(&verdict.reason, "error"),
            }),
            ProcessStatus::Pending => analysis.pending.push(FlaggedProcess {
                name: name.clone(),
                reason: or_default(&verdict.reason, "pending"),
            }),
            ProcessStatus::Disabled => analysis.disabled.push(name.clone()),
            ProcessStatus::Foreground => analysis.foreground.push(name.clone()),
            _ => analysis.other.push(name.clone()),
        }

        if !verdict.ready {
            analysis.not_ready.push(FlaggedProcess {
                name,
                reason: verdict.reason,
            });
        }
    }

    analysis
}
