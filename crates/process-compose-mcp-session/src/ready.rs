//! Waiting for processes to become ready.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use process_compose_mcp_analysis::{evaluate, FlaggedProcess};
use process_compose_mcp_client::ProcessComposeClient;
use process_compose_mcp_core::{ProcessRecord, Result};

/// Which processes to wait for and how long.
#[derive(Debug, Clone)]
pub struct ReadyCondition {
    /// Target processes; every process when `None` or empty
    pub names: Option<Vec<String>>,

    /// Maximum time to wait
    pub timeout: Duration,

    /// Polling interval between snapshots
    pub poll_interval: Duration,
}

impl Default for ReadyCondition {
    fn default() -> Self {
        Self {
            names: None,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ReadyCondition {
    /// Wait for every process.
    pub fn all() -> Self {
        Self::default()
    }

    /// Wait for the named processes only.
    pub fn for_names(names: Vec<String>) -> Self {
        Self {
            names: Some(names),
            ..Self::default()
        }
    }

    /// Set timeout duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn targets(&self) -> Option<&[String]> {
        self.names.as_deref().filter(|names| !names.is_empty())
    }
}

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Serialize)]
pub struct ReadyResult {
    /// Whether every target was ready
    pub ready: bool,

    /// Time waited in milliseconds
    pub waited_ms: u64,

    /// Targets that were not ready in the last snapshot
    pub not_ready: Vec<FlaggedProcess>,

    /// Last snapshot taken
    pub last_snapshot: Vec<ProcessRecord>,
}

/// Targets in `snapshot` that are not ready.
///
/// A named target missing from the snapshot counts as not ready.
pub fn pending_targets(snapshot: &[ProcessRecord], names: Option<&[String]>) -> Vec<FlaggedProcess> {
    let flag = |record: &ProcessRecord| {
        let verdict = evaluate(record);
        (!verdict.ready).then(|| FlaggedProcess {
            name: record.name.clone(),
            reason: verdict.reason,
        })
    };

    match names {
        None => snapshot.iter().filter_map(flag).collect(),
        Some(names) => names
            .iter()
            .filter_map(|name| match snapshot.iter().find(|r| &r.name == name) {
                Some(record) => flag(record),
                None => Some(FlaggedProcess {
                    name: name.clone(),
                    reason: "not found".to_string(),
                }),
            })
            .collect(),
    }
}

/// Poll the process list until every target is ready or the timeout elapses.
///
/// At least one snapshot is always taken. Errors from the API end the wait.
pub async fn await_ready(
    client: &ProcessComposeClient,
    condition: &ReadyCondition,
) -> Result<ReadyResult> {
    let start = Instant::now();
    let deadline = start + condition.timeout;

    loop {
        let snapshot = client.list_processes().await?;
        let not_ready = pending_targets(&snapshot, condition.targets());
        let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if not_ready.is_empty() {
            debug!("All targets ready after {}ms", waited_ms);
            return Ok(ReadyResult {
                ready: true,
                waited_ms,
                not_ready,
                last_snapshot: snapshot,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("{} targets still not ready after {}ms", not_ready.len(), waited_ms);
            return Ok(ReadyResult {
                ready: false,
                waited_ms,
                not_ready,
                last_snapshot: snapshot,
            });
        }
        tokio::time::sleep(condition.poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ProcessRecord {
        ProcessRecord::from_value(value).unwrap()
    }

    fn snapshot() -> Vec<ProcessRecord> {
        vec![
            record(json!({"name": "web", "status": "Running", "is_ready": "Ready", "has_ready_probe": true})),
            record(json!({"name": "db", "status": "Running", "is_ready": "Not Ready", "has_ready_probe": true})),
            record(json!({"name": "seed", "status": "Completed", "exit_code": 0})),
        ]
    }

    #[test]
    fn test_ready_condition_defaults() {
        let condition = ReadyCondition::all();
        assert!(condition.names.is_none());
        assert_eq!(condition.timeout, Duration::from_secs(30));
        assert_eq!(condition.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_empty_names_means_every_process() {
        let condition = ReadyCondition::for_names(vec![]);
        assert!(condition.targets().is_none());
    }

    #[test]
    fn test_pending_targets_all() {
        let pending = pending_targets(&snapshot(), None);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "db");
    }

    #[test]
    fn test_pending_targets_named() {
        let names = vec!["web".to_string(), "seed".to_string()];
        assert!(pending_targets(&snapshot(), Some(&names)).is_empty());

        let names = vec!["web".to_string(), "ghost".to_string()];
        let pending = pending_targets(&snapshot(), Some(&names));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "ghost");
        assert_eq!(pending[0].reason, "not found");
    }

    #[test]
    fn test_ready_result_serialization() {
        let result = ReadyResult {
            ready: false,
            waited_ms: 12,
            not_ready: vec![],
            last_snapshot: snapshot(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ready"], json!(false));
        assert_eq!(value["waited_ms"], json!(12));
        assert_eq!(value["not_ready"], json!([]));
        assert_eq!(value["last_snapshot"][0]["name"], json!("web"));
        assert_eq!(value["last_snapshot"][1]["is_ready"], json!("Not Ready"));
        assert!(value.get("waitedMs").is_none());
    }
}
