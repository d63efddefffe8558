//! Supervisor launch helpers: binary lookup, port probing, arguments and
//! working directory.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

use process_compose_mcp_core::session::LOOPBACK;
use process_compose_mcp_core::{Endpoint, Error, Result};
use tracing::debug;

/// File name of the supervisor binary on this platform.
pub fn binary_name() -> &'static str {
    if cfg!(windows) {
        "process-compose.exe"
    } else {
        "process-compose"
    }
}

/// Resolve the supervisor binary.
///
/// An existing override wins, then `<cwd>/bin/<binary>`, then the bare name
/// for a PATH lookup.
pub fn locate_binary(override_path: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = override_path {
        if path.exists() {
            return path.to_path_buf();
        }
        debug!("Binary override {} does not exist", path.display());
    }

    let bundled = cwd.join("bin").join(binary_name());
    if bundled.exists() {
        return bundled;
    }

    PathBuf::from(binary_name())
}

/// First port in `base..base+attempts` that binds on the loopback address.
pub fn pick_port(base: u16, attempts: u16) -> Result<u16> {
    for offset in 0..attempts {
        let Some(port) = base.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((LOOPBACK, port)) {
            Ok(listener) => {
                drop(listener);
                debug!("Picked API port {}", port);
                return Ok(port);
            }
            Err(e) => debug!("Port {} unavailable: {}", port, e),
        }
    }
    Err(Error::NoFreePort { base, attempts })
}

/// Default socket path, unique to this server process.
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("process-compose-{}.sock", std::process::id()))
}

/// Command-line arguments for a headless supervisor bound to `endpoint`.
pub fn build_args(
    configs: &[String],
    env_files: &[String],
    endpoint: &Endpoint,
    keep_project: bool,
) -> Vec<String> {
    let mut args = Vec::with_capacity(2 * (configs.len() + env_files.len()) + 5);
    for config in configs {
        args.push("-f".to_string());
        args.push(config.clone());
    }
    for env_file in env_files {
        args.push("-e".to_string());
        args.push(env_file.clone());
    }
    args.push("-t=false".to_string());

    match endpoint {
        Endpoint::Tcp { port, .. } => {
            args.push("--port".to_string());
            args.push(port.to_string());
        }
        Endpoint::Unix { path } => {
            args.push("--use-uds".to_string());
            args.push("--unix-socket".to_string());
            args.push(path.display().to_string());
        }
    }

    if keep_project {
        args.push("--keep-project".to_string());
    }
    args
}

/// Nearest directory at or above `start` containing `marker`, searching at
/// most `depth` directories. Falls back to `start`.
pub fn find_working_dir(start: &Path, marker: &str, depth: usize) -> PathBuf {
    start
        .ancestors()
        .take(depth)
        .find(|dir| dir.join(marker).exists())
        .unwrap_or(start)
        .to_path_buf()
}
