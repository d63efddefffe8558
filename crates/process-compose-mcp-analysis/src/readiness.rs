//! Per-process readiness verdict.

use process_compose_mcp_core::{ProcessRecord, ProcessStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Health value meaning "ready".
pub const HEALTH_READY: &str = "Ready";

/// Health value meaning "no probe / not applicable".
pub const HEALTH_NOT_APPLICABLE: &str = "-";

/// Readiness verdict for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Readiness {
    /// Whether the process counts as ready
    pub ready: bool,
    /// Why it is not ready (empty when ready, except for disabled processes)
    pub reason: String,
}

impl Readiness {
    fn ready(reason: impl Into<String>) -> Self {
        Self {
            ready: true,
            reason: reason.into(),
        }
    }

    fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: reason.into(),
        }
    }
}

/// Evaluate the readiness of a single process.
///
/// Status decides first; health and exit code only count for ready-evaluable
/// statuses. A disabled process is ready whatever its health says.
pub fn evaluate(record: &ProcessRecord) -> Readiness {
    if !record.status.is_ready_evaluable() {
        return Readiness::not_ready(format!("status is {}", record.status));
    }
    if record.status == ProcessStatus::Disabled {
        return Readiness::ready("process is disabled");
    }

    let health = record.health.as_deref();
    if record.has_probe() && health != Some(HEALTH_READY) {
        return Readiness::not_ready(format!("health is {}", health.unwrap_or("Unknown")));
    }
    if let Some(health) = health {
        if health != HEALTH_READY && health != HEALTH_NOT_APPLICABLE {
            return Readiness::not_ready(format!("health is {health}"));
        }
    }

    let exit_code = record.exit_code_or_zero();
    if exit_code != 0 {
        return Readiness::not_ready(format!("failed with exit code {exit_code}"));
    }

    Readiness::ready("")
}
