//! process-compose MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! It routes MCP tool calls to the session manager and the control-API client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer,
};

use tracing::{debug, error, info, instrument, warn};

use process_compose_mcp_analysis::classify;
use process_compose_mcp_client::{follow, stream, FollowSettings, LogStreamRequest, LogWindow};
use process_compose_mcp_client::ProcessComposeClient;
use process_compose_mcp_core::{Error, ServerConfig};
use process_compose_mcp_session::{await_ready, ReadyCondition, SessionManager};

use crate::tools::*;

/// Map a library error onto a JSON-RPC error.
///
/// Caller mistakes become invalid-params; everything else is internal.
pub fn mcp_error(err: Error) -> McpError {
    let code = match err {
        Error::NoActiveSession | Error::AlreadyRunning | Error::InvalidInput(_) => {
            ErrorCode(-32602) // Invalid params
        }
        _ => ErrorCode(-32603), // Internal error
    };
    McpError::new(code, err.to_string(), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::new(
            ErrorCode(-32603), // Internal error
            format!("Failed to serialize response: {e}"),
            None,
        )
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Running log follows, all children of one session token.
#[derive(Debug, Default)]
struct FollowRegistry {
    session: CancellationToken,
    follows: HashMap<Uuid, CancellationToken>,
}

impl FollowRegistry {
    fn register(&mut self) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let token = self.session.child_token();
        self.follows.insert(id, token.clone());
        (id, token)
    }

    fn cancel(&mut self, id: &Uuid) -> bool {
        match self.follows.remove(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every follow and start a fresh session token.
    fn cancel_all(&mut self) -> usize {
        let cancelled = self.follows.len();
        self.session.cancel();
        self.session = CancellationToken::new();
        self.follows.clear();
        cancelled
    }
}

/// process-compose MCP Server
///
/// Owns the supervisor session and exposes it via MCP tools.
#[derive(Clone)]
pub struct ProcessComposeMcpServer {
    /// The single supervisor session, serialized behind a mutex
    sessions: Arc<Mutex<SessionManager>>,
    /// Active log follows
    follows: Arc<Mutex<FollowRegistry>>,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

impl Default for ProcessComposeMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl ProcessComposeMcpServer {
    /// Create a new server with the default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new server with the given configuration
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(SessionManager::from_config(&config))),
            follows: Arc::new(Mutex::new(FollowRegistry::default())),
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Client bound to the live session (helper method)
    async fn client(&self) -> Result<ProcessComposeClient, McpError> {
        self.sessions.lock().await.client().map_err(mcp_error)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Start the supervisor
    #[tool(
        description = "Start process-compose headless (TUI disabled) with its API on a free localhost port or a Unix socket"
    )]
    #[instrument(skip_all)]
    async fn start_session(
        &self,
        Parameters(params): Parameters<StartSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Starting session: configs={:?}, env_files={:?}, port={:?}, use_uds={}",
            params.configs, params.env_files, params.port, params.use_uds
        );

        let mut sessions = self.sessions.lock().await;
        let info = sessions.start(params.into()).await.map_err(|e| {
            error!("Failed to start session: {}", e);
            mcp_error(e)
        })?;

        json_result(&info)
    }

    /// Stop the supervisor
    #[tool(description = "Stop the running process-compose session and cancel its log follows")]
    #[instrument(skip_all)]
    async fn stop_session(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let follows_cancelled = self.follows.lock().await.cancel_all();
        let result = self.sessions.lock().await.stop().await;
        info!(
            "Session stopped: stopped={}, pid={:?}, follows_cancelled={}",
            result.stopped, result.pid, follows_cancelled
        );

        json_result(&StopSessionResponse {
            result,
            follows_cancelled,
        })
    }

    /// Describe the session
    #[tool(description = "Show the session state, endpoint and recent supervisor output")]
    #[instrument(skip_all)]
    async fn session_info(
        &self,
        Parameters(params): Parameters<SessionInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        let active_follows = self.follows.lock().await.follows.len();
        let sessions = self.sessions.lock().await;

        json_result(&SessionInfoResponse {
            state: sessions.state().name().to_string(),
            session: sessions.session().cloned(),
            recent_output: sessions.recent_output(params.output_lines),
            active_follows,
        })
    }

    // =========================================================================
    // Project
    // =========================================================================

    /// Summarize process states
    #[tool(description = "Return counts per status, running and failed lists, and project state")]
    #[instrument(skip_all)]
    async fn status_summary(
        &self,
        Parameters(params): Parameters<StatusSummaryParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let records = client.list_processes().await.map_err(mcp_error)?;
        let project = client
            .project_state(params.with_memory)
            .await
            .map_err(mcp_error)?;

        json_result(&StatusSummary::from_snapshot(&records, project))
    }

    /// Project name and state
    #[tool(description = "Return project name and state")]
    #[instrument(skip_all)]
    async fn project_info(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let name = match client.project_name().await {
            Ok(name) => name,
            Err(e) => {
                debug!("Project name unavailable: {}", e);
                None
            }
        };
        let state = client.project_state(false).await.map_err(mcp_error)?;

        json_result(&ProjectInfoResponse { name, state })
    }

    /// Reload configuration
    #[tool(description = "Reload the project configuration")]
    #[instrument(skip_all)]
    async fn reload_project(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        json_result(&client.reload_project().await.map_err(mcp_error)?)
    }

    /// Stop the project
    #[tool(description = "Stop every process of the project; the supervisor keeps running")]
    #[instrument(skip_all)]
    async fn stop_project(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        json_result(&client.stop_project().await.map_err(mcp_error)?)
    }

    // =========================================================================
    // Processes
    // =========================================================================

    /// List processes
    #[tool(description = "List processes and their state")]
    #[instrument(skip_all)]
    async fn list_processes(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let records = client.list_processes().await.map_err(mcp_error)?;
        debug!("Listed {} processes", records.len());
        json_result(&records)
    }

    /// One process
    #[tool(description = "Get a single process state")]
    #[instrument(skip_all)]
    async fn get_process(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        json_result(&client.get_process(&params.name).await.map_err(mcp_error)?)
    }

    /// Start a process
    #[tool(description = "Start a process")]
    #[instrument(skip_all)]
    async fn start_process(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        client.start_process(&params.name).await.map_err(mcp_error)?;
        info!("Started process '{}'", params.name);
        json_result(&json!({ "started": params.name }))
    }

    /// Stop a process
    #[tool(description = "Stop a process")]
    #[instrument(skip_all)]
    async fn stop_process(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        client.stop_process(&params.name).await.map_err(mcp_error)?;
        info!("Stopped process '{}'", params.name);
        json_result(&json!({ "stopped": params.name }))
    }

    /// Restart a process
    #[tool(description = "Restart a process")]
    #[instrument(skip_all)]
    async fn restart_process(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        client.restart_process(&params.name).await.map_err(mcp_error)?;
        info!("Restarted process '{}'", params.name);
        json_result(&json!({ "restarted": params.name }))
    }

    /// Scale a process
    #[tool(description = "Scale a process to the given number of replicas")]
    #[instrument(skip_all)]
    async fn scale_process(
        &self,
        Parameters(params): Parameters<ScaleProcessParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        client
            .scale_process(&params.name, params.replicas)
            .await
            .map_err(mcp_error)?;
        info!("Scaled process '{}' to {}", params.name, params.replicas);
        json_result(&ScaleProcessResponse {
            scaled: params.name,
            replicas: params.replicas,
        })
    }

    /// Start several processes
    #[tool(description = "Start multiple processes; reports per-process outcome")]
    #[instrument(skip_all)]
    async fn start_processes(
        &self,
        Parameters(params): Parameters<ProcessNamesParams>,
    ) -> Result<CallToolResult, McpError> {
        require_names(&params.names)?;
        let client = self.client().await?;
        json_result(&client.start_processes(&params.names).await)
    }

    /// Stop several processes
    #[tool(description = "Stop multiple processes")]
    #[instrument(skip_all)]
    async fn stop_processes(
        &self,
        Parameters(params): Parameters<ProcessNamesParams>,
    ) -> Result<CallToolResult, McpError> {
        require_names(&params.names)?;
        let client = self.client().await?;
        json_result(&client.stop_processes(&params.names).await.map_err(mcp_error)?)
    }

    /// Open ports
    #[tool(description = "Get the TCP and UDP ports a process listens on")]
    #[instrument(skip_all)]
    async fn get_ports(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        json_result(&client.get_ports(&params.name).await.map_err(mcp_error)?)
    }

    // =========================================================================
    // Logs
    // =========================================================================

    /// Recent logs
    #[tool(description = "Return recent logs for a process")]
    #[instrument(skip_all)]
    async fn get_logs(
        &self,
        Parameters(params): Parameters<GetLogsParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let lines = client
            .get_logs(&params.name, params.end_offset, params.limit)
            .await
            .map_err(mcp_error)?;
        json_result(&LogLinesResponse::new(params.name, lines))
    }

    /// Truncate logs
    #[tool(description = "Truncate a process log buffer")]
    #[instrument(skip_all)]
    async fn truncate_logs(
        &self,
        Parameters(params): Parameters<ProcessNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        client.truncate_logs(&params.name).await.map_err(mcp_error)?;
        json_result(&json!({ "truncated": params.name }))
    }

    /// Bounded log read
    #[tool(
        description = "Read logs over the WebSocket stream and return the window captured before max_messages or timeout_ms"
    )]
    #[instrument(skip_all)]
    async fn stream_logs(
        &self,
        Parameters(params): Parameters<StreamLogsParams>,
    ) -> Result<CallToolResult, McpError> {
        let endpoint = self.client().await?.endpoint();
        let logs = &self.config.logs;
        let request = LogStreamRequest {
            names: vec![params.name.clone()],
            offset: params.offset,
            follow: true,
            max_messages: params.max_messages.unwrap_or(logs.max_messages),
            timeout: Duration::from_millis(params.timeout_ms.unwrap_or(logs.timeout_ms)),
        };

        let window = stream(&endpoint, &request).await.map_err(mcp_error)?;
        debug!("Captured {} log lines for '{}'", window.count, params.name);
        json_result(&LogLinesResponse::new(params.name, window.lines))
    }

    /// Start following logs
    #[tool(
        description = "Continuously forward a process's logs as MCP logging notifications until follow_logs_stop or stop_session"
    )]
    #[instrument(skip_all)]
    async fn follow_logs_start(
        &self,
        Parameters(params): Parameters<FollowLogsParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let endpoint = self.client().await?.endpoint();
        let (id, token) = self.follows.lock().await.register();

        let logs = &self.config.logs;
        let settings = FollowSettings {
            window_messages: logs.follow_window_messages,
            window_timeout: Duration::from_millis(logs.follow_window_timeout_ms),
            idle: Duration::from_millis(logs.follow_idle_ms),
        };

        let name = params.name.clone();
        let peer = context.peer.clone();
        let follows = Arc::clone(&self.follows);
        let (tx, mut rx) = mpsc::channel::<LogWindow>(16);

        tokio::spawn(async move {
            let forward = follow(endpoint, vec![name.clone()], params.offset, settings, tx, token);
            let notify = async {
                while let Some(window) = rx.recv().await {
                    let notification = LoggingMessageNotificationParam {
                        level: LoggingLevel::Info,
                        logger: Some(format!("process-compose/{name}")),
                        data: json!({
                            "follow_id": id.to_string(),
                            "name": name,
                            "lines": window.lines,
                        }),
                    };
                    if let Err(e) = peer.notify_logging_message(notification).await {
                        warn!("Dropping log follow {}: {}", id, e);
                        break;
                    }
                }
            };

            let (result, ()) = tokio::join!(forward, notify);
            if let Err(e) = result {
                warn!("Log follow {} for '{}' ended: {}", id, name, e);
            }
            follows.lock().await.follows.remove(&id);
        });

        info!("Following logs of '{}' as {}", params.name, id);
        json_result(&FollowLogsResponse {
            follow_id: id.to_string(),
            name: params.name,
            message: "Log lines are delivered as logging notifications".to_string(),
        })
    }

    /// Stop following logs
    #[tool(description = "Stop a log follow started with follow_logs_start")]
    #[instrument(skip_all)]
    async fn follow_logs_stop(
        &self,
        Parameters(params): Parameters<FollowStopParams>,
    ) -> Result<CallToolResult, McpError> {
        let id = Uuid::parse_str(&params.follow_id).map_err(|_| {
            McpError::new(
                ErrorCode(-32602), // Invalid params
                format!("Invalid follow ID format: {}", params.follow_id),
                None,
            )
        })?;
        let stopped = self.follows.lock().await.cancel(&id);

        json_result(&FollowStopResponse {
            follow_id: params.follow_id,
            stopped,
        })
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    /// Wait for readiness
    #[tool(
        description = "Wait until target processes are ready (running, healthy where probed, zero exit)"
    )]
    #[instrument(skip_all)]
    async fn await_ready(
        &self,
        Parameters(params): Parameters<AwaitReadyParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let readiness = &self.config.readiness;
        let condition = ReadyCondition {
            names: params.names,
            timeout: Duration::from_millis(params.timeout_ms.unwrap_or(readiness.timeout_ms)),
            poll_interval: Duration::from_millis(
                params.interval_ms.unwrap_or(readiness.poll_interval_ms).max(1),
            ),
        };

        let result = await_ready(&client, &condition).await.map_err(mcp_error)?;
        info!(
            "Readiness wait finished: ready={}, waited_ms={}",
            result.ready, result.waited_ms
        );
        json_result(&result)
    }

    /// Classify processes
    #[tool(description = "Categorize processes by state and include readiness reasons and details")]
    #[instrument(skip_all)]
    async fn analyze_processes(
        &self,
        Parameters(_params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client().await?;
        let records = client.list_processes().await.map_err(mcp_error)?;
        json_result(&classify(&records))
    }
}

fn require_names(names: &[String]) -> Result<(), McpError> {
    if names.is_empty() {
        return Err(mcp_error(Error::InvalidInput(
            "names must contain at least one process".to_string(),
        )));
    }
    Ok(())
}

#[tool_handler]
impl rmcp::ServerHandler for ProcessComposeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "process-compose MCP Server - Drive a process-compose supervisor. \
                 Use start_session to launch it, list_processes or analyze_processes to inspect state, \
                 await_ready to wait for readiness, and get_logs or stream_logs to read output. \
                 follow_logs_start forwards logs as logging notifications."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_logging()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
