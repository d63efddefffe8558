//! Process records reported by the supervisor.
//!
//! The control API is loosely typed: the same value can arrive under several
//! field names depending on the supervisor version. [`ProcessRecord`] is the
//! one canonical shape, populated by [`ProcessRecord::from_value`] at the
//! ingestion boundary. The raw object is kept for pass-through output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Field names carrying the health/readiness value, in resolution order.
pub const HEALTH_FIELDS: [&str; 3] = ["is_ready", "Health", "health"];

/// Field names carrying the readiness-probe flag, in resolution order.
pub const PROBE_FIELDS: [&str; 2] = ["has_ready_probe", "HasHealthProbe"];

/// Resolve the first of `keys` present in `obj` with a non-null value.
pub fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// Lifecycle status of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    /// Process is running
    Running,
    /// Process was launched (daemon or short-lived start)
    Launched,
    /// Process is being restarted
    Restarting,
    /// Process exited
    Completed,
    /// Process failed to start
    Error,
    /// Process waits for its dependencies
    Pending,
    /// Process is disabled in the project
    Disabled,
    /// Process runs in the foreground
    Foreground,
    /// Process is shutting down
    Terminating,
    /// Process was skipped
    Skipped,
    /// Any status this crate does not know about
    Other(String),
}

impl ProcessStatus {
    /// Parse a raw status string. Unknown values are preserved.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Running" => Self::Running,
            "Launched" => Self::Launched,
            "Restarting" => Self::Restarting,
            "Completed" => Self::Completed,
            "Error" => Self::Error,
            "Pending" => Self::Pending,
            "Disabled" => Self::Disabled,
            "Foreground" => Self::Foreground,
            "Terminating" => Self::Terminating,
            "Skipped" => Self::Skipped,
            other => Self::Other(other.to_string()),
        }
    }

    /// The status string as the supervisor reports it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "Running",
            Self::Launched => "Launched",
            Self::Restarting => "Restarting",
            Self::Completed => "Completed",
            Self::Error => "Error",
            Self::Pending => "Pending",
            Self::Disabled => "Disabled",
            Self::Foreground => "Foreground",
            Self::Terminating => "Terminating",
            Self::Skipped => "Skipped",
            Self::Other(raw) => raw,
        }
    }

    /// Whether health and exit code carry meaning for this status.
    pub fn is_ready_evaluable(&self) -> bool {
        matches!(
            self,
            Self::Running
                | Self::Foreground
                | Self::Launched
                | Self::Completed
                | Self::Skipped
                | Self::Disabled
                | Self::Restarting
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical view of one process record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    /// Process name, unique within a project
    pub name: String,
    /// Replica namespace, if reported
    pub namespace: Option<String>,
    /// Authoritative lifecycle status
    pub status: ProcessStatus,
    /// Exit code, meaningful once the process is terminal
    pub exit_code: Option<i64>,
    /// Advisory running flag
    pub is_running: Option<bool>,
    /// Normalized health value
    pub health: Option<String>,
    /// Whether a readiness probe is configured, if reported
    pub has_ready_probe: Option<bool>,
    raw: Value,
}

impl ProcessRecord {
    /// Build a record from a raw control-API object.
    pub fn from_value(raw: Value) -> crate::Result<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            crate::Error::InvalidInput(format!("process record is not an object: {raw}"))
        })?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::Error::InvalidInput("process record without name".to_string()))?
            .to_string();

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .map(ProcessStatus::parse)
            .unwrap_or_else(|| ProcessStatus::Other("Unknown".to_string()));

        let health = first_present(obj, &HEALTH_FIELDS).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        Ok(Self {
            namespace: obj
                .get("namespace")
                .and_then(Value::as_str)
                .map(str::to_string),
            exit_code: obj.get("exit_code").and_then(Value::as_i64),
            is_running: obj.get("is_running").and_then(Value::as_bool),
            has_ready_probe: first_present(obj, &PROBE_FIELDS).and_then(Value::as_bool),
            name,
            status,
            health,
            raw,
        })
    }

    /// The record exactly as the supervisor sent it.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Exit code, treating an absent one as success.
    pub fn exit_code_or_zero(&self) -> i64 {
        self.exit_code.unwrap_or(0)
    }

    /// Whether a readiness probe is configured.
    pub fn has_probe(&self) -> bool {
        self.has_ready_probe == Some(true)
    }
}

impl Serialize for ProcessRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProcessRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for raw in ["Running", "Completed", "Disabled", "Skipped", "Terminating"] {
            assert_eq!(ProcessStatus::parse(raw).as_str(), raw);
        }
        let unknown = ProcessStatus::parse("Scheduled");
        assert_eq!(unknown, ProcessStatus::Other("Scheduled".to_string()));
        assert_eq!(unknown.to_string(), "Scheduled");
    }

    #[test]
    fn test_ready_evaluable_set() {
        assert!(ProcessStatus::Running.is_ready_evaluable());
        assert!(ProcessStatus::Skipped.is_ready_evaluable());
        assert!(ProcessStatus::Restarting.is_ready_evaluable());
        assert!(!ProcessStatus::Pending.is_ready_evaluable());
        assert!(!ProcessStatus::Error.is_ready_evaluable());
        assert!(!ProcessStatus::Terminating.is_ready_evaluable());
        assert!(!ProcessStatus::parse("Scheduled").is_ready_evaluable());
    }

    #[test]
    fn test_from_value_snake_case_fields() {
        let record = ProcessRecord::from_value(json!({
            "name": "db",
            "namespace": "default",
            "status": "Running",
            "exit_code": 0,
            "is_running": true,
            "is_ready": "Ready",
            "has_ready_probe": true
        }))
        .unwrap();

        assert_eq!(record.name, "db");
        assert_eq!(record.namespace.as_deref(), Some("default"));
        assert_eq!(record.status, ProcessStatus::Running);
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.is_running, Some(true));
        assert_eq!(record.health.as_deref(), Some("Ready"));
        assert!(record.has_probe());
    }

    #[test]
    fn test_from_value_alternate_field_names() {
        let record = ProcessRecord::from_value(json!({
            "name": "api",
            "status": "Running",
            "Health": "Not Ready",
            "HasHealthProbe": true
        }))
        .unwrap();

        assert_eq!(record.health.as_deref(), Some("Not Ready"));
        assert_eq!(record.has_ready_probe, Some(true));
    }

    #[test]
    fn test_health_first_present_wins() {
        let record = ProcessRecord::from_value(json!({
            "name": "api",
            "status": "Running",
            "is_ready": null,
            "Health": "-",
            "health": "Ready"
        }))
        .unwrap();

        assert_eq!(record.health.as_deref(), Some("-"));
    }

    #[test]
    fn test_missing_optional_fields() {
        let record = ProcessRecord::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(record.status.as_str(), "Unknown");
        assert_eq!(record.exit_code_or_zero(), 0);
        assert_eq!(record.health, None);
        assert!(!record.has_probe());
    }

    #[test]
    fn test_rejects_non_objects_and_unnamed() {
        assert!(ProcessRecord::from_value(json!([1, 2])).is_err());
        assert!(ProcessRecord::from_value(json!({"status": "Running"})).is_err());
    }

    #[test]
    fn test_serializes_raw_record() {
        let raw = json!({"name": "db", "status": "Running", "pid": 42, "mem": 1024});
        let record: ProcessRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
        assert_eq!(record.raw()["pid"], 42);
    }
}
