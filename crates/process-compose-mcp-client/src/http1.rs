//! Minimal HTTP/1.1 framing for the Unix socket transport.
//!
//! One request per connection: the request carries `Connection: close` and
//! the response is read to EOF before decoding.

use process_compose_mcp_core::{Error, Result};
use reqwest::Method;

use crate::transport::RawResponse;

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Encode a request for `path` with an optional JSON body.
pub(crate) fn encode_request(method: &Method, path: &str, body: Option<&[u8]>) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nAccept: application/json\r\n",
        method.as_str(),
        path
    );
    match body {
        Some(body) => {
            head.push_str("Content-Type: application/json\r\n");
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        None if *method != Method::GET => head.push_str("Content-Length: 0\r\n"),
        None => {}
    }
    head.push_str("\r\n");

    let mut request = head.into_bytes();
    if let Some(body) = body {
        request.extend_from_slice(body);
    }
    request
}

/// Decode a complete response read up to EOF.
pub(crate) fn decode_response(raw: &[u8]) -> Result<RawResponse> {
    let head_len = find(raw, HEAD_END)
        .ok_or_else(|| malformed("response ended before end of headers"))?;
    let head = std::str::from_utf8(&raw[..head_len])
        .map_err(|_| malformed("response head is not UTF-8"))?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(malformed(&format!("bad status line: {status_line}")));
    }
    let status: u16 = parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| malformed(&format!("bad status line: {status_line}")))?;
    let reason = parts.next().unwrap_or_default().trim().to_string();

    let mut content_length = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        }
    }

    let payload = &raw[head_len + HEAD_END.len()..];
    let body = if status == 204 || status == 304 || (100..200).contains(&status) {
        Vec::new()
    } else if chunked {
        decode_chunked(payload)?
    } else if let Some(len) = content_length {
        if payload.len() < len {
            return Err(malformed("response body shorter than Content-Length"));
        }
        payload[..len].to_vec()
    } else {
        payload.to_vec()
    };

    Ok(RawResponse {
        status,
        reason,
        body,
    })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = find(data, b"\r\n").ok_or_else(|| malformed("truncated chunk size"))?;
        let size_line = std::str::from_utf8(&data[..line_end])
            .map_err(|_| malformed("chunk size is not UTF-8"))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| malformed(&format!("bad chunk size: {size_hex}")))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        let end = size
            .checked_add(2)
            .ok_or_else(|| malformed(&format!("chunk size too large: {size_hex}")))?;
        if data.len() < end {
            return Err(malformed("truncated chunk"));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[end..];
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn malformed(detail: &str) -> Error {
    Error::Transport(format!("malformed HTTP response: {detail}"))
}
