//! Supervisor stdout/stderr capture.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Longest line kept; the rest of an overlong line is discarded.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Bounded tail of output lines shared between the capture tasks and the
/// session.
///
/// Once full, the oldest line is dropped for every new one.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    /// Create a tail keeping at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line.
    pub fn push(&self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// The last `n` lines, oldest first.
    pub fn last(&self, n: usize) -> Vec<String> {
        let lines = self.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Every retained line, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// The last `n` lines joined with newlines.
    pub fn render_last(&self, n: usize) -> String {
        self.last(n).join("\n")
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of retained lines.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy every line of `reader` into the tail until EOF.
    ///
    /// Invalid UTF-8 is replaced rather than ending the capture.
    pub(crate) fn capture<R>(&self, reader: R, source: &'static str) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                match read_line_capped(&mut reader, &mut buf).await {
                    Ok(true) => {
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        trace!(source, "{}", line);
                        tail.push(line);
                    }
                    Ok(false) => break,
                    Err(e) => {
                        debug!(source, "Output capture ended: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// Read one line into `buf` without its newline, keeping at most
/// `MAX_LINE_BYTES`. Returns false at EOF with nothing read.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;

        let (used, content, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, i, true),
            None => (available.len(), available.len(), false),
        };
        let room = MAX_LINE_BYTES.saturating_sub(buf.len());
        buf.extend_from_slice(&available[..content.min(room)]);
        reader.consume(used);

        if done {
            return Ok(true);
        }
    }
}
