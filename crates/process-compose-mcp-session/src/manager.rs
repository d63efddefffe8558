//! Lifecycle of the single supervised process-compose instance.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use process_compose_mcp_client::ProcessComposeClient;
use process_compose_mcp_core::{
    ClientSettings, Endpoint, Error, Result, ServerConfig, SessionInfo, SupervisorSettings,
};

use crate::launch::{build_args, default_socket_path, find_working_dir, locate_binary, pick_port};
use crate::output::OutputTail;

/// Time allowed for capture tasks to drain after the supervisor exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How to launch the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Config files; configured defaults when empty
    pub configs: Vec<String>,
    /// Env files; configured defaults when empty
    pub env_files: Vec<String>,
    /// First port probed in TCP mode
    pub port: Option<u16>,
    /// Keep the project alive after its processes exit
    pub keep_project: Option<bool>,
    /// Serve the API on a Unix socket instead of TCP
    pub use_local_socket: bool,
    /// Socket path in Unix socket mode
    pub socket_path: Option<PathBuf>,
}

/// Outcome of [`SessionManager::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StopResult {
    /// Whether a live session was stopped
    pub stopped: bool,
    /// Pid of the stopped supervisor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// A supervisor that answered its liveness check.
#[derive(Debug)]
pub struct LiveSession {
    child: Child,
    info: SessionInfo,
    output: OutputTail,
    client: ProcessComposeClient,
}

impl LiveSession {
    /// Whether the supervisor process is still running.
    fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("Supervisor pid {:?} exited with {}", self.info.pid, status);
                false
            }
            Err(e) => {
                warn!("Could not query supervisor status: {}", e);
                true
            }
        }
    }
}

/// Session state. Transitions: Idle -> Launching -> Live -> Idle, and
/// Launching -> Idle on failure.
#[derive(Debug, Default)]
pub enum SessionState {
    /// No supervisor
    #[default]
    Idle,
    /// Supervisor spawned, waiting for its API
    Launching,
    /// Supervisor API is live
    Live(LiveSession),
}

impl SessionState {
    /// Short name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Live(_) => "live",
        }
    }
}

/// Holds `Launching` for the duration of a launch and falls back to `Idle`
/// unless the launch completes, including when the launch is cancelled.
struct LaunchGuard<'a> {
    state: &'a mut SessionState,
}

impl<'a> LaunchGuard<'a> {
    fn enter(state: &'a mut SessionState) -> Self {
        *state = SessionState::Launching;
        Self { state }
    }

    fn complete(self, live: LiveSession) {
        *self.state = SessionState::Live(live);
    }
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Launching) {
            *self.state = SessionState::Idle;
        }
    }
}

/// Owns at most one supervisor process.
///
/// The supervisor is killed when the manager is dropped.
#[derive(Debug)]
pub struct SessionManager {
    supervisor: SupervisorSettings,
    client: ClientSettings,
    state: SessionState,
}

impl SessionManager {
    /// Create a manager with the given settings.
    pub fn new(supervisor: SupervisorSettings, client: ClientSettings) -> Self {
        Self {
            supervisor,
            client,
            state: SessionState::Idle,
        }
    }

    /// Create a manager from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.supervisor.clone(), config.client.clone())
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether a session is live.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SessionState::Live(_))
    }

    /// Information about the live session.
    pub fn session(&self) -> Option<&SessionInfo> {
        match &self.state {
            SessionState::Live(live) => Some(&live.info),
            _ => None,
        }
    }

    /// Client bound to the live session.
    pub fn client(&self) -> Result<ProcessComposeClient> {
        match &self.state {
            SessionState::Live(live) => Ok(live.client.clone()),
            _ => Err(Error::NoActiveSession),
        }
    }

    /// Retained supervisor output of the live session.
    pub fn recent_output(&self, lines: usize) -> Vec<String> {
        match &self.state {
            SessionState::Live(live) => live.output.last(lines),
            _ => Vec::new(),
        }
    }

    /// Launch the supervisor and wait for its API.
    pub async fn start(&mut self, options: StartOptions) -> Result<SessionInfo> {
        self.ensure_startable()?;

        let guard = LaunchGuard::enter(&mut self.state);
        let live = launch(&self.supervisor, &self.client, options).await?;
        let info = live.info.clone();
        guard.complete(live);

        info!("Session live: {:?}", info);
        Ok(info)
    }

    fn ensure_startable(&mut self) -> Result<()> {
        match &mut self.state {
            SessionState::Idle => Ok(()),
            SessionState::Launching => Err(Error::AlreadyRunning),
            SessionState::Live(live) => {
                if live.is_running() {
                    return Err(Error::AlreadyRunning);
                }
                info!("Discarding session whose supervisor already exited");
                self.state = SessionState::Idle;
                Ok(())
            }
        }
    }

    /// Stop the live supervisor.
    ///
    /// Sends SIGTERM where available, waits for the grace period, then
    /// kills. Failures are logged and otherwise ignored.
    pub async fn stop(&mut self) -> StopResult {
        if !self.is_live() {
            return StopResult {
                stopped: false,
                pid: None,
            };
        }
        let SessionState::Live(mut live) = std::mem::take(&mut self.state) else {
            return StopResult {
                stopped: false,
                pid: None,
            };
        };

        let pid = live.info.pid;
        info!("Stopping supervisor pid {:?}", pid);
        terminate(&mut live.child, self.supervisor.stop_grace()).await;

        StopResult { stopped: true, pid }
    }
}

async fn launch(
    supervisor: &SupervisorSettings,
    client_settings: &ClientSettings,
    options: StartOptions,
) -> Result<LiveSession> {
    let cwd = std::env::current_dir()?;
    let binary = locate_binary(supervisor.binary.as_deref(), &cwd);

    let endpoint = if options.use_local_socket {
        Endpoint::unix(options.socket_path.unwrap_or_else(default_socket_path))
    } else {
        let base = options.port.unwrap_or(supervisor.base_port);
        Endpoint::loopback(pick_port(base, supervisor.port_attempts)?)
    };

    let configs = if options.configs.is_empty() {
        supervisor.default_configs.clone()
    } else {
        options.configs
    };
    let env_files = if options.env_files.is_empty() {
        supervisor.default_env_files.clone()
    } else {
        options.env_files
    };
    let keep_project = options.keep_project.unwrap_or(supervisor.keep_project);
    let args = build_args(&configs, &env_files, &endpoint, keep_project);
    let workdir = find_working_dir(&cwd, &supervisor.repo_marker, supervisor.repo_search_depth);

    info!(
        "Launching {} {} in {}",
        binary.display(),
        args.join(" "),
        workdir.display()
    );

    let mut child = Command::new(&binary)
        .args(&args)
        .current_dir(&workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            error!("Failed to spawn {}: {}", binary.display(), e);
            std::io::Error::new(e.kind(), format!("failed to spawn {}: {}", binary.display(), e))
        })?;

    let output = OutputTail::new(supervisor.output_tail_lines);
    let mut capture = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        capture.push(output.capture(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        capture.push(output.capture(stderr, "stderr"));
    }

    let client = ProcessComposeClient::new(&endpoint)?
        .with_timeout(client_settings.request_timeout())
        .with_live_poll_interval(client_settings.live_poll_interval());

    let launch_timeout = supervisor.launch_timeout();
    let exited = tokio::select! {
        live = client.wait_until_live(launch_timeout) => match live {
            Ok(()) => None,
            Err(e) => {
                warn!("Supervisor did not become live: {}", e);
                let _ = child.kill().await;
                return Err(Error::LaunchTimeout {
                    timeout_ms: supervisor.launch_timeout_ms,
                    output: output.render_last(supervisor.launch_output_lines),
                });
            }
        },
        status = child.wait() => Some(status?),
    };

    if let Some(status) = exited {
        for handle in capture {
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, handle).await;
        }
        warn!("Supervisor exited before becoming live: {}", status);
        return Err(Error::LaunchFailed {
            status: status.to_string(),
            output: output.render_last(supervisor.launch_output_lines),
        });
    }

    let project_name = match client.project_name().await {
        Ok(name) => name,
        Err(e) => {
            debug!("Project name unavailable: {}", e);
            None
        }
    };

    let info = SessionInfo::new(&endpoint, child.id()).with_project_name(project_name);
    Ok(LiveSession {
        child,
        info,
        output,
        client,
    })
}

async fn terminate(child: &mut Child, grace: Duration) {
    if exited_gracefully(child, grace).await {
        return;
    }
    if let Err(e) = child.kill().await {
        debug!("Kill failed: {}", e);
    }
}

#[cfg(unix)]
async fn exited_gracefully(child: &mut Child, grace: Duration) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    send_sigterm(pid);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("Supervisor exited with {}", status);
            true
        }
        Ok(Err(e)) => {
            warn!("Failed waiting for supervisor: {}", e);
            false
        }
        Err(_) => {
            warn!(
                "Supervisor did not exit within {}ms, killing",
                grace.as_millis()
            );
            false
        }
    }
}

#[cfg(not(unix))]
async fn exited_gracefully(_child: &mut Child, _grace: Duration) -> bool {
    false
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: plain signal delivery to a child we spawned.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}
