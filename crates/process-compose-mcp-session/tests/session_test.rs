//! Session lifecycle tests with a scripted stand-in for the supervisor.
//!
//! The binary is `/bin/sh` and the config file is a shell script: the launch
//! arguments start with `-f <config>`, so sh runs the script.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

use process_compose_mcp_core::{ClientSettings, Error, SupervisorSettings};
use process_compose_mcp_session::{
    await_ready, ReadyCondition, SessionManager, StartOptions, StopResult,
};

fn script(dir: &Path, body: &str) -> String {
    let path = dir.join("supervisor.sh");
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

fn manager(launch_timeout_ms: u64) -> SessionManager {
    let supervisor = SupervisorSettings {
        binary: Some(PathBuf::from("/bin/sh")),
        launch_timeout_ms,
        stop_grace_ms: 1_000,
        ..SupervisorSettings::default()
    };
    let client = ClientSettings {
        request_timeout_ms: 1_000,
        live_poll_interval_ms: 50,
    };
    SessionManager::new(supervisor, client)
}

/// Minimal control API on a Unix socket.
fn serve_api(path: &Path) {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 512];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_string();
                let path = head.split(' ').nth(1).unwrap_or_default().to_string();
                let body = match path.as_str() {
                    "/project/name" => r#"{"projectName":"demo"}"#,
                    "/processes" => {
                        r#"{"data":[{"name":"web","status":"Running","is_ready":"Ready","has_ready_probe":true}]}"#
                    }
                    _ => r#"{"status":"alive"}"#,
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
}

#[tokio::test]
async fn test_session_lifecycle_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("pc.sock");
    serve_api(&socket);

    let mut manager = manager(5_000);
    let options = StartOptions {
        configs: vec![script(dir.path(), "exec sleep 30\n")],
        use_local_socket: true,
        socket_path: Some(socket.clone()),
        ..StartOptions::default()
    };

    let info = manager.start(options.clone()).await.unwrap();
    assert_eq!(info.project_name.as_deref(), Some("demo"));
    assert_eq!(info.socket_path.as_deref(), Some(socket.as_path()));
    assert_eq!(info.base_url, "http+unix");
    assert_eq!(info.port, 0);
    assert!(info.pid.is_some());
    assert_eq!(manager.session(), Some(&info));

    // A second start while the supervisor runs is refused
    let err = manager.start(options).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    let client = manager.client().unwrap();
    let result = await_ready(
        &client,
        &ReadyCondition::all().with_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap();
    assert!(result.ready);
    assert_eq!(result.last_snapshot.len(), 1);

    let stopped = manager.stop().await;
    assert_eq!(
        stopped,
        StopResult {
            stopped: true,
            pid: info.pid
        }
    );
    assert!(manager.session().is_none());
    assert!(matches!(manager.client(), Err(Error::NoActiveSession)));
    assert!(!manager.stop().await.stopped);
}

#[tokio::test]
async fn test_early_exit_fails_launch_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(10_000);
    let options = StartOptions {
        configs: vec![script(dir.path(), "echo 'bad config' >&2\nexit 3\n")],
        ..StartOptions::default()
    };

    let err = manager.start(options).await.unwrap_err();
    match err {
        Error::LaunchFailed { status, output } => {
            assert!(status.contains('3'), "status: {status}");
            assert!(output.contains("bad config"), "output: {output}");
        }
        other => panic!("expected LaunchFailed, got {other:?}"),
    }
    assert_eq!(manager.state().name(), "idle");
}

#[tokio::test]
async fn test_launch_timeout_reports_recent_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(400);
    let options = StartOptions {
        configs: vec![script(dir.path(), "echo starting\nexec sleep 30\n")],
        ..StartOptions::default()
    };

    let started = std::time::Instant::now();
    let err = manager.start(options).await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(400));
    match err {
        Error::LaunchTimeout { timeout_ms, output } => {
            assert_eq!(timeout_ms, 400);
            assert!(output.contains("starting"), "output: {output}");
        }
        other => panic!("expected LaunchTimeout, got {other:?}"),
    }
    assert!(!manager.is_live());
}
