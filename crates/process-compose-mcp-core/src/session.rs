//! Session types for the supervised process-compose instance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Loopback address the supervisor API binds to in TCP mode.
pub const LOOPBACK: &str = "127.0.0.1";

/// Where the supervisor control API listens.
///
/// Exactly one of TCP or Unix socket, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Endpoint {
    /// HTTP over TCP
    Tcp {
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
    },
    /// HTTP over a Unix domain socket
    Unix {
        /// Socket path
        path: PathBuf,
    },
}

impl Endpoint {
    /// TCP endpoint on the loopback interface.
    pub fn loopback(port: u16) -> Self {
        Self::Tcp {
            host: LOOPBACK.to_string(),
            port,
        }
    }

    /// Unix socket endpoint.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Base URL of the request/response API.
    pub fn base_url(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("http://{host}:{port}"),
            Self::Unix { .. } => "http+unix".to_string(),
        }
    }

    /// WebSocket URL for `path_and_query` on this endpoint.
    ///
    /// Over a Unix socket the host part only feeds the handshake headers.
    pub fn ws_url(&self, path_and_query: &str) -> String {
        match self {
            Self::Tcp { host, port } => format!("ws://{host}:{port}{path_and_query}"),
            Self::Unix { .. } => format!("ws://localhost{path_and_query}"),
        }
    }

    /// Socket path, if this is a Unix endpoint.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix { path } => Some(path),
            Self::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Information about the live supervisor session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    /// Address the API is reached on
    pub address: String,
    /// TCP port (0 in Unix socket mode)
    pub port: u16,
    /// Base URL of the API
    pub base_url: String,
    /// Socket path in Unix socket mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Project name reported by the supervisor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Supervisor process id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl SessionInfo {
    /// Create session info for a supervisor reachable on `endpoint`.
    pub fn new(endpoint: &Endpoint, pid: Option<u32>) -> Self {
        let port = match endpoint {
            Endpoint::Tcp { port, .. } => *port,
            Endpoint::Unix { .. } => 0,
        };
        let address = match endpoint {
            Endpoint::Tcp { host, .. } => host.clone(),
            Endpoint::Unix { .. } => LOOPBACK.to_string(),
        };
        Self {
            address,
            port,
            base_url: endpoint.base_url(),
            socket_path: endpoint.socket_path().map(Path::to_path_buf),
            project_name: None,
            pid,
        }
    }

    /// Attach the project name.
    pub fn with_project_name(mut self, project_name: Option<String>) -> Self {
        self.project_name = project_name;
        self
    }

    /// The endpoint this session was bound to.
    pub fn endpoint(&self) -> Endpoint {
        match &self.socket_path {
            Some(path) => Endpoint::unix(path.clone()),
            None => Endpoint::Tcp {
                host: self.address.clone(),
                port: self.port,
            },
        }
    }
}
