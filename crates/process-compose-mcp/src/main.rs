//! # process-compose MCP Server
//!
//! Model Context Protocol server for AI agents to drive a process-compose
//! supervisor.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Session management (start, stop, inspect the supervisor)
//! - Process control (list, start, stop, restart, scale)
//! - Logs (recent lines, bounded streaming, follow via notifications)
//! - Readiness (await ready, analyze processes)
//!
//! ## Architecture
//!
//! This is the main MCP server binary that ties together:
//! - process-compose-mcp-core: Core types and configuration
//! - process-compose-mcp-client: Control API client
//! - process-compose-mcp-session: Supervisor lifecycle
//! - process-compose-mcp-analysis: Status classification

use std::path::PathBuf;

use process_compose_mcp::ProcessComposeMcpServer;
use process_compose_mcp_core::ServerConfig;
use rmcp::{transport::stdio, ServiceExt};

/// Environment variable naming the server config file.
const ENV_CONFIG: &str = "PC_MCP_CONFIG";

fn config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    match args.iter().position(|arg| arg == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => Ok(Some(PathBuf::from(path))),
            None => anyhow::bail!("--config requires a path"),
        },
        None => Ok(std::env::var_os(ENV_CONFIG).map(PathBuf::from)),
    }
}

fn load_config(args: &[String]) -> anyhow::Result<ServerConfig> {
    let mut config = match config_path(args)? {
        Some(path) => ServerConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?,
        None => ServerConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config = load_config(&args)?;

    // Initialize logging; stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(
        "process-compose MCP Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let server = ProcessComposeMcpServer::with_config(config);

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("process-compose MCP Server running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    tracing::info!("process-compose MCP Server shutting down");

    Ok(())
}
