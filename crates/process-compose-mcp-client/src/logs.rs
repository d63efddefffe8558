//! Bounded reads from the process log WebSocket.
//!
//! A read is a best-effort window: it ends on the message cap, on the
//! deadline, or when the server closes, and returns whatever arrived.
//! [`follow`] repeats windows until cancelled.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use process_compose_mcp_core::{first_present, Endpoint, Error, Result};

const MESSAGE_FIELDS: [&str; 2] = ["Message", "message"];

/// Upper bound on the closing handshake after a window ends.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(250);

/// Lines collected in one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWindow {
    /// Message text in arrival order
    pub lines: Vec<String>,
    /// Number of lines
    pub count: usize,
}

impl LogWindow {
    fn new(lines: Vec<String>) -> Self {
        Self {
            count: lines.len(),
            lines,
        }
    }
}

/// Parameters of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamRequest {
    /// Processes whose logs are read
    pub names: Vec<String>,
    /// Starting offset
    pub offset: u64,
    /// Ask the server to keep following new output
    pub follow: bool,
    /// Stop after this many lines
    pub max_messages: usize,
    /// Stop after this long, connect included
    pub timeout: Duration,
}

impl LogStreamRequest {
    /// Following read of `names` from offset 0 with the default bounds.
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            offset: 0,
            follow: true,
            max_messages: 200,
            timeout: Duration::from_millis(3000),
        }
    }

    /// Path and query of the log WebSocket for this request.
    pub fn path(&self) -> String {
        format!(
            "/process/logs/ws?name={}&offset={}&follow={}",
            urlencoding::encode(&self.names.join(",")),
            self.offset,
            self.follow
        )
    }
}

/// Read one bounded window of log lines.
///
/// The timeout covers the connect as well; a deadline that passes before the
/// handshake completes yields an empty window.
pub async fn stream(endpoint: &Endpoint, request: &LogStreamRequest) -> Result<LogWindow> {
    if request.max_messages == 0 {
        return Ok(LogWindow::default());
    }

    let deadline = Instant::now() + request.timeout;
    let url = endpoint.ws_url(&request.path());
    debug!("Opening log stream {}", url);

    let lines = match endpoint {
        Endpoint::Tcp { .. } => {
            let connect = tokio_tungstenite::connect_async(url.as_str());
            let Ok(connected) = tokio::time::timeout_at(deadline, connect).await else {
                debug!("Log stream {} not open within {:?}", url, request.timeout);
                return Ok(LogWindow::default());
            };
            let (ws, _) = connected.map_err(stream_error)?;
            read_window(ws, request.max_messages, deadline).await?
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => {
            let connect = async {
                let socket = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| Error::Transport(format!("{}: {}", path.display(), e)))?;
                tokio_tungstenite::client_async(url.as_str(), socket)
                    .await
                    .map_err(stream_error)
            };
            let Ok(connected) = tokio::time::timeout_at(deadline, connect).await else {
                debug!("Log stream {} not open within {:?}", url, request.timeout);
                return Ok(LogWindow::default());
            };
            let (ws, _) = connected?;
            read_window(ws, request.max_messages, deadline).await?
        }
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => {
            return Err(Error::InvalidInput(
                "Unix domain sockets are not supported on this platform".to_string(),
            ))
        }
    };

    Ok(LogWindow::new(lines))
}

async fn read_window<S>(
    mut ws: WebSocketStream<S>,
    max_messages: usize,
    deadline: Instant,
) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    while lines.len() < max_messages {
        let Ok(next) = tokio::time::timeout_at(deadline, ws.next()).await else {
            break;
        };
        match next {
            None | Some(Ok(Message::Close(_))) => break,
            Some(Ok(Message::Text(text))) => push_line(&mut lines, text.as_bytes()),
            Some(Ok(Message::Binary(data))) => push_line(&mut lines, &data),
            Some(Ok(_)) => {}
            Some(Err(e)) if is_closed(&e) => break,
            Some(Err(e)) => return Err(stream_error(e)),
        }
    }

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
    Ok(lines)
}

fn push_line(lines: &mut Vec<String>, payload: &[u8]) {
    let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(payload) else {
        return;
    };
    let text = match first_present(&obj, &MESSAGE_FIELDS) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return,
    };
    if !text.is_empty() {
        lines.push(text);
    }
}

fn is_closed(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
            )
    )
}

fn stream_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Io(e) => Error::Transport(e.to_string()),
        tungstenite::Error::Http(response) => {
            Error::Stream(format!("handshake rejected with HTTP {}", response.status()))
        }
        other => Error::Stream(other.to_string()),
    }
}

/// Window shape for continuous forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowSettings {
    /// Line cap per window
    pub window_messages: usize,
    /// Time cap per window
    pub window_timeout: Duration,
    /// Pause between windows
    pub idle: Duration,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            window_messages: 100,
            window_timeout: Duration::from_millis(1000),
            idle: Duration::from_millis(200),
        }
    }
}

/// Forward log windows to `tx` until `cancel` fires or the receiver goes away.
///
/// Empty windows are not sent. A failed window ends forwarding with its error.
pub async fn follow(
    endpoint: Endpoint,
    names: Vec<String>,
    offset: u64,
    settings: FollowSettings,
    tx: mpsc::Sender<LogWindow>,
    cancel: CancellationToken,
) -> Result<()> {
    let request = LogStreamRequest {
        names,
        offset,
        follow: true,
        max_messages: settings.window_messages,
        timeout: settings.window_timeout,
    };
    info!("Following logs of {:?}", request.names);

    loop {
        let window = tokio::select! {
            _ = cancel.cancelled() => break,
            window = stream(&endpoint, &request) => window?,
        };

        if window.count > 0 && tx.send(window).await.is_err() {
            break;
        }
        if tx.is_closed() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.idle) => {}
        }
    }

    info!("Stopped following logs of {:?}", request.names);
    Ok(())
}
