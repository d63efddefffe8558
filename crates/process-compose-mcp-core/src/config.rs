//! Configuration types for the process-compose MCP server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the supervisor binary location.
pub const ENV_BINARY: &str = "PC_BINARY";

/// Environment variable overriding the base port probed for the API.
pub const ENV_DEFAULT_PORT: &str = "PC_DEFAULT_PORT";

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Supervisor launch settings
    pub supervisor: SupervisorSettings,
    /// Control API client settings
    pub client: ClientSettings,
    /// Log streaming settings
    pub logs: LogSettings,
    /// Readiness polling settings
    pub readiness: ReadinessSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PC_BINARY` / `PC_DEFAULT_PORT` from the process environment.
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup(ENV_BINARY).filter(|v| !v.trim().is_empty()) {
            self.supervisor.binary = Some(PathBuf::from(binary));
        }
        if let Some(port) = lookup(ENV_DEFAULT_PORT).filter(|v| !v.trim().is_empty()) {
            self.supervisor.base_port = port.trim().parse().map_err(|_| {
                crate::Error::Config(format!("{ENV_DEFAULT_PORT} is not a valid port: {port}"))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.supervisor.port_attempts == 0 {
            return Err(crate::Error::Config(
                "supervisor.port_attempts must be > 0".to_string(),
            ));
        }

        if self.supervisor.launch_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "supervisor.launch_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.client.request_timeout_ms == 0 || self.client.live_poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "client timeouts must be > 0".to_string(),
            ));
        }

        if self.logs.follow_window_messages == 0 || self.logs.follow_window_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "logs.follow_window_* must be > 0".to_string(),
            ));
        }

        if self.readiness.poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "readiness.poll_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// How the supervisor process is located and launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Explicit path to the process-compose binary
    pub binary: Option<PathBuf>,
    /// First loopback port probed for the API
    pub base_port: u16,
    /// Number of successive ports probed
    pub port_attempts: u16,
    /// Time allowed for the API to become live
    pub launch_timeout_ms: u64,
    /// Time allowed for a graceful exit before the supervisor is killed
    pub stop_grace_ms: u64,
    /// Config files used when a start request names none
    pub default_configs: Vec<String>,
    /// Env files used when a start request names none
    pub default_env_files: Vec<String>,
    /// Default for keeping the project alive after its processes exit
    pub keep_project: bool,
    /// Lines of supervisor stdout/stderr retained
    pub output_tail_lines: usize,
    /// Lines of retained output attached to launch errors
    pub launch_output_lines: usize,
    /// Marker looked for when choosing the supervisor working directory
    pub repo_marker: String,
    /// Parent directories searched for the marker
    pub repo_search_depth: usize,
}

impl SupervisorSettings {
    /// Launch budget as a duration.
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    /// Stop grace period as a duration.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            binary: None,
            base_port: 8080,
            port_attempts: 100,
            launch_timeout_ms: 40_000,
            stop_grace_ms: 5_000,
            default_configs: vec!["process-compose.yaml".to_string()],
            default_env_files: vec![".env".to_string()],
            keep_project: true,
            output_tail_lines: 200,
            launch_output_lines: 40,
            repo_marker: ".git".to_string(),
            repo_search_depth: 6,
        }
    }
}

/// Control API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Interval between liveness checks
    pub live_poll_interval_ms: u64,
}

impl ClientSettings {
    /// Per-request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Liveness poll interval as a duration.
    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_millis(self.live_poll_interval_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            live_poll_interval_ms: 250,
        }
    }
}

/// Log streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default line cap for a bounded read
    pub max_messages: usize,
    /// Default time cap for a bounded read
    pub timeout_ms: u64,
    /// Line cap of each window while following
    pub follow_window_messages: usize,
    /// Time cap of each window while following
    pub follow_window_timeout_ms: u64,
    /// Pause between windows while following
    pub follow_idle_ms: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_messages: 200,
            timeout_ms: 3_000,
            follow_window_messages: 100,
            follow_window_timeout_ms: 1_000,
            follow_idle_ms: 200,
        }
    }
}

/// Readiness polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Default overall wait
    pub timeout_ms: u64,
    /// Default interval between snapshots
    pub poll_interval_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            poll_interval_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.supervisor.base_port, 8080);
        assert_eq!(config.supervisor.port_attempts, 100);
        assert_eq!(config.supervisor.launch_timeout(), Duration::from_secs(40));
        assert_eq!(config.client.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.client.live_poll_interval(),
            Duration::from_millis(250)
        );
        assert_eq!(config.supervisor.repo_search_depth, 6);
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_attempts() {
        let mut config = ServerConfig::default();
        config.supervisor.port_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_poll_interval() {
        let mut config = ServerConfig::default();
        config.readiness.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  log_level: debug

supervisor:
  binary: /opt/bin/process-compose
  base_port: 9000
  port_attempts: 10
  default_configs:
    - compose.yaml
    - compose.override.yaml
  keep_project: false

client:
  request_timeout_ms: 2000

logs:
  max_messages: 50
"#;

        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(
            config.supervisor.binary.as_deref(),
            Some(Path::new("/opt/bin/process-compose"))
        );
        assert_eq!(config.supervisor.base_port, 9000);
        assert_eq!(config.supervisor.port_attempts, 10);
        assert_eq!(config.supervisor.default_configs.len(), 2);
        assert!(!config.supervisor.keep_project);
        assert_eq!(config.client.request_timeout_ms, 2000);
        assert_eq!(config.client.live_poll_interval_ms, 250);
        assert_eq!(config.logs.max_messages, 50);
        assert_eq!(config.logs.timeout_ms, 3000);
    }

    #[test]
    fn test_parse_yaml_rejects_invalid_values() {
        let yaml = r#"
client:
  request_timeout_ms: 0
"#;
        assert!(ServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env_with(|key| match key {
                ENV_BINARY => Some("/usr/local/bin/pc".to_string()),
                ENV_DEFAULT_PORT => Some("18080".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(
            config.supervisor.binary,
            Some(PathBuf::from("/usr/local/bin/pc"))
        );
        assert_eq!(config.supervisor.base_port, 18080);
    }

    #[test]
    fn test_env_overrides_ignore_blank_values() {
        let mut config = ServerConfig::default();
        config
            .apply_env_with(|_| Some("  ".to_string()))
            .unwrap();
        assert_eq!(config.supervisor.binary, None);
        assert_eq!(config.supervisor.base_port, 8080);
    }

    #[test]
    fn test_env_override_invalid_port() {
        let mut config = ServerConfig::default();
        let result = config.apply_env_with(|key| {
            (key == ENV_DEFAULT_PORT).then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
