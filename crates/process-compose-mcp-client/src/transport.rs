//! Request/response transports to the control API.
//!
//! A [`Transport`] is chosen once from the session [`Endpoint`] and never
//! changes afterwards. Both variants return the same [`RawResponse`] so the
//! client decodes them through one code path.

use process_compose_mcp_core::{Endpoint, Error, Result};
use reqwest::Method;
use tracing::debug;

/// Undecoded control-API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Response body
    pub body: Vec<u8>,
}

/// Connection strategy bound to one endpoint.
#[derive(Debug, Clone)]
pub enum Transport {
    /// HTTP over TCP
    Tcp(TcpTransport),
    /// HTTP over a Unix domain socket
    #[cfg(unix)]
    Unix(UnixTransport),
}

impl Transport {
    /// Build the transport for `endpoint`.
    pub fn for_endpoint(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => Ok(Self::Tcp(TcpTransport::new(host, *port)?)),
            #[cfg(unix)]
            Endpoint::Unix { path } => Ok(Self::Unix(UnixTransport::new(path.clone()))),
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => Err(Error::InvalidInput(
                "Unix domain sockets are not supported on this platform".to_string(),
            )),
        }
    }

    /// The endpoint this transport talks to.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Tcp(tcp) => Endpoint::Tcp {
                host: tcp.host.clone(),
                port: tcp.port,
            },
            #[cfg(unix)]
            Self::Unix(unix) => Endpoint::unix(unix.path.clone()),
        }
    }

    /// Send one request and collect the full response.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse> {
        debug!("{} {} via {}", method, path, self.endpoint());
        match self {
            Self::Tcp(tcp) => tcp.send(method, path, body).await,
            #[cfg(unix)]
            Self::Unix(unix) => unix.send(method, path, body).await,
        }
    }
}

/// HTTP over TCP using a shared reqwest client.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    http: reqwest::Client,
    base_url: String,
    host: String,
    port: u16,
}

impl TcpTransport {
    fn new(host: &str, port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: format!("http://{host}:{port}"),
            host: host.to_string(),
            port,
        })
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<RawResponse> {
        let mut request = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_vec(),
        })
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}

/// HTTP over a Unix domain socket, one connection per request.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixTransport {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixTransport {
    fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<RawResponse> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let io_error = |e: std::io::Error| {
            Error::Transport(format!("{}: {}", self.path.display(), e))
        };

        let mut stream = UnixStream::connect(&self.path).await.map_err(io_error)?;
        let request = crate::http1::encode_request(&method, path, body.as_deref());
        stream.write_all(&request).await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.map_err(io_error)?;
        crate::http1::decode_response(&raw)
    }
}
