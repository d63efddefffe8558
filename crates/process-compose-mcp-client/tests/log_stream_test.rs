//! Log stream tests against in-process WebSocket servers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use process_compose_mcp_client::{follow, stream, FollowSettings, LogStreamRequest};
use process_compose_mcp_core::{Endpoint, Error};

/// Serve each connection `messages`, then either close or hold it open.
async fn ws_server(messages: Vec<String>, close_after: bool) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let messages = messages.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                for message in messages {
                    if ws.send(Message::Text(message)).await.is_err() {
                        return;
                    }
                }
                if close_after {
                    let _ = ws.close(None).await;
                } else {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            });
        }
    });
    Endpoint::loopback(port)
}

fn lines(texts: &[&str]) -> Vec<String> {
    texts
        .iter()
        .map(|t| serde_json::json!({"Message": t, "ProcessName": "web"}).to_string())
        .collect()
}

fn request(max_messages: usize, timeout_ms: u64) -> LogStreamRequest {
    let mut request = LogStreamRequest::new(vec!["web".to_string()]);
    request.max_messages = max_messages;
    request.timeout = Duration::from_millis(timeout_ms);
    request
}

#[tokio::test]
async fn test_stream_stops_at_max_messages() {
    let endpoint = ws_server(lines(&["a", "b", "c", "d", "e"]), false).await;

    let started = Instant::now();
    let window = stream(&endpoint, &request(3, 5000)).await.unwrap();

    assert_eq!(window.lines, vec!["a", "b", "c"]);
    assert_eq!(window.count, 3);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stream_returns_partial_window_on_timeout() {
    let endpoint = ws_server(lines(&["only"]), false).await;

    let started = Instant::now();
    let window = stream(&endpoint, &request(10, 300)).await.unwrap();

    assert_eq!(window.lines, vec!["only"]);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_stream_returns_on_close() {
    let mut messages = lines(&["first"]);
    messages.push(r#"{"message":"second","processName":"web"}"#.to_string());
    messages.push("not json".to_string());
    messages.push(r#"{"Message":""}"#.to_string());
    messages.push(r#"{"ProcessName":"web"}"#.to_string());
    messages.extend(lines(&["third"]));
    let endpoint = ws_server(messages, true).await;

    let started = Instant::now();
    let window = stream(&endpoint, &request(200, 5000)).await.unwrap();

    assert_eq!(window.lines, vec!["first", "second", "third"]);
    assert_eq!(window.count, 3);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stream_sends_names_offset_and_follow() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(None));
    let seen_by_server = seen.clone();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen_by_server.lock().unwrap() = Some(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();
        let _ = ws.close(None).await;
    });

    let mut req = LogStreamRequest::new(vec!["web".to_string(), "db".to_string()]);
    req.offset = 7;
    req.follow = false;
    stream(&Endpoint::loopback(port), &req).await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("/process/logs/ws?name=web%2Cdb&offset=7&follow=false")
    );
}

#[tokio::test]
async fn test_stream_connect_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    assert!(stream(&Endpoint::loopback(port), &request(10, 1000))
        .await
        .is_err());
}

#[tokio::test]
async fn test_stream_handshake_timeout_yields_empty_window() {
    // Accepts TCP but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });

    let started = Instant::now();
    let window = stream(&Endpoint::loopback(port), &request(10, 300))
        .await
        .unwrap();

    assert!(window.lines.is_empty());
    assert_eq!(window.count, 0);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_stream_fails_on_protocol_violation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for message in lines(&["a", "b"]) {
            ws.send(Message::Text(message)).await.unwrap();
        }
        // FIN frame with reserved opcode 0x3
        let tcp = ws.get_mut();
        tcp.write_all(&[0x83, 0x00]).await.unwrap();
        tcp.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let result = stream(&Endpoint::loopback(port), &request(10, 3000)).await;
    match result {
        Err(Error::Stream(message)) => assert!(!message.is_empty()),
        other => panic!("expected stream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_follow_survives_unanswered_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });

    let (tx, _rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let settings = FollowSettings {
        window_messages: 10,
        window_timeout: Duration::from_millis(100),
        idle: Duration::from_millis(10),
    };
    let task = tokio::spawn(follow(
        Endpoint::loopback(port),
        vec!["web".to_string()],
        0,
        settings,
        tx,
        cancel.clone(),
    ));

    // Several empty windows elapse without ending the follow
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!task.is_finished());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stream_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pc.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        for message in lines(&["over", "uds"]) {
            ws.send(Message::Text(message)).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    let window = stream(&Endpoint::unix(path), &request(10, 5000))
        .await
        .unwrap();
    assert_eq!(window.lines, vec!["over", "uds"]);
}

#[tokio::test]
async fn test_follow_forwards_windows_until_cancelled() {
    let endpoint = ws_server(lines(&["tick"]), true).await;
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let settings = FollowSettings {
        window_messages: 10,
        window_timeout: Duration::from_millis(500),
        idle: Duration::from_millis(20),
    };

    let task = tokio::spawn(follow(
        endpoint,
        vec!["web".to_string()],
        0,
        settings,
        tx,
        cancel.clone(),
    ));

    for _ in 0..2 {
        let window = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(window.lines, vec!["tick"]);
    }

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_follow_stops_when_receiver_dropped() {
    let endpoint = ws_server(lines(&["tick"]), true).await;
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        follow(
            endpoint,
            vec!["web".to_string()],
            0,
            FollowSettings::default(),
            tx,
            CancellationToken::new(),
        ),
    )
    .await
    .unwrap();
    assert!(result.is_ok());
}
