//! Typed operations on the process-compose control API.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use process_compose_mcp_core::{Endpoint, Error, ProcessRecord, Result};
use reqwest::Method;

use crate::transport::{RawResponse, Transport};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between liveness checks.
pub const DEFAULT_LIVE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Open ports of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPorts {
    /// Process name
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Listening TCP ports
    #[serde(deserialize_with = "null_as_default")]
    pub tcp_ports: Vec<u16>,
    /// Listening UDP ports
    #[serde(deserialize_with = "null_as_default")]
    pub udp_ports: Vec<u16>,
}

/// The supervisor encodes empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct ProcessesState {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<ProcessRecord>,
}

#[derive(Deserialize)]
struct ProjectName {
    #[serde(rename = "projectName", default)]
    project_name: Option<String>,
}

#[derive(Deserialize)]
struct LogsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    logs: Vec<String>,
}

/// Client for one supervisor instance.
#[derive(Debug, Clone)]
pub struct ProcessComposeClient {
    transport: Transport,
    timeout: Duration,
    live_poll_interval: Duration,
}

impl ProcessComposeClient {
    /// Create a client bound to `endpoint` with default timeouts.
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self {
            transport: Transport::for_endpoint(endpoint)?,
            timeout: DEFAULT_TIMEOUT,
            live_poll_interval: DEFAULT_LIVE_POLL_INTERVAL,
        })
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the interval between liveness checks.
    pub fn with_live_poll_interval(mut self, interval: Duration) -> Self {
        self.live_poll_interval = interval;
        self
    }

    /// The endpoint this client is bound to.
    pub fn endpoint(&self) -> Endpoint {
        self.transport.endpoint()
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Value> {
        let response = tokio::time::timeout(self.timeout, self.transport.send(method, path, body))
            .await
            .map_err(|_| Error::Timeout(millis(self.timeout)))??;
        decode(response)
    }

    async fn request_as<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let value = self.request(method, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the API answers its liveness check.
    pub async fn live(&self) -> bool {
        match self.request(Method::GET, "/live", None).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Liveness check failed: {}", e);
                false
            }
        }
    }

    /// Poll [`live`](Self::live) until it succeeds or `timeout` elapses.
    ///
    /// Failures while polling are swallowed; only the deadline produces
    /// [`Error::NotLive`], and never before it has passed.
    pub async fn wait_until_live(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(true) = tokio::time::timeout_at(deadline, self.live()).await {
                info!("process-compose API is live at {}", self.endpoint());
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NotLive(millis(timeout)));
            }
            tokio::time::sleep(self.live_poll_interval.min(deadline - now)).await;
        }
    }

    /// Project name, if the supervisor reports one.
    pub async fn project_name(&self) -> Result<Option<String>> {
        let name: ProjectName = self.request_as(Method::GET, "/project/name").await?;
        Ok(name.project_name)
    }

    /// Project state, optionally including memory usage.
    pub async fn project_state(&self, with_memory: bool) -> Result<Value> {
        self.request(
            Method::GET,
            &format!("/project/state?withMemory={with_memory}"),
            None,
        )
        .await
    }

    /// Reload the project configuration.
    pub async fn reload_project(&self) -> Result<Value> {
        self.request(Method::POST, "/project/configuration", None)
            .await
    }

    /// Stop the whole project.
    pub async fn stop_project(&self) -> Result<Value> {
        self.request(Method::POST, "/project/stop", None).await
    }

    /// All processes, in supervisor order.
    pub async fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        let state: ProcessesState = self.request_as(Method::GET, "/processes").await?;
        Ok(state.data)
    }

    /// One process by name.
    pub async fn get_process(&self, name: &str) -> Result<ProcessRecord> {
        let value = self
            .request(Method::GET, &format!("/process/{}", encode(name)), None)
            .await?;
        ProcessRecord::from_value(value)
    }

    /// Start a process.
    pub async fn start_process(&self, name: &str) -> Result<Value> {
        self.request(Method::POST, &format!("/process/start/{}", encode(name)), None)
            .await
    }

    /// Restart a process.
    pub async fn restart_process(&self, name: &str) -> Result<Value> {
        self.request(Method::POST, &format!("/process/restart/{}", encode(name)), None)
            .await
    }

    /// Stop a process.
    pub async fn stop_process(&self, name: &str) -> Result<Value> {
        self.request(Method::PATCH, &format!("/process/stop/{}", encode(name)), None)
            .await
    }

    /// Stop several processes in one call; the supervisor reports per name.
    pub async fn stop_processes(&self, names: &[String]) -> Result<Value> {
        let body = serde_json::to_vec(names)?;
        self.request(Method::PATCH, "/processes/stop", Some(body))
            .await
    }

    /// Start several processes one by one.
    ///
    /// A failure is recorded against its name and does not stop the rest.
    pub async fn start_processes(&self, names: &[String]) -> BTreeMap<String, String> {
        let mut results = BTreeMap::new();
        for name in names {
            let outcome = match self.start_process(name).await {
                Ok(_) => "started".to_string(),
                Err(e) => {
                    warn!("Failed to start process '{}': {}", name, e);
                    format!("error: {e}")
                }
            };
            results.insert(name.clone(), outcome);
        }
        results
    }

    /// Change the replica count of a process.
    pub async fn scale_process(&self, name: &str, replicas: u32) -> Result<Value> {
        self.request(
            Method::PATCH,
            &format!("/process/scale/{}/{}", encode(name), replicas),
            None,
        )
        .await
    }

    /// Log lines of a process ending `end_offset` lines from the tail.
    pub async fn get_logs(&self, name: &str, end_offset: u64, limit: u64) -> Result<Vec<String>> {
        let logs: LogsResponse = self
            .request_as(
                Method::GET,
                &format!("/process/logs/{}/{}/{}", encode(name), end_offset, limit),
            )
            .await?;
        Ok(logs.logs)
    }

    /// Drop the buffered logs of a process.
    pub async fn truncate_logs(&self, name: &str) -> Result<Value> {
        self.request(Method::DELETE, &format!("/process/logs/{}", encode(name)), None)
            .await
    }

    /// Open ports of a process.
    pub async fn get_ports(&self, name: &str) -> Result<ProcessPorts> {
        self.request_as(Method::GET, &format!("/process/ports/{}", encode(name)))
            .await
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Turn a raw response into a JSON value.
///
/// Non-2xx becomes [`Error::Api`]; 204 and empty bodies become an empty
/// object without a parse attempt.
fn decode(response: RawResponse) -> Result<Value> {
    if !(200..300).contains(&response.status) {
        return Err(Error::Api {
            status: response.status,
            message: error_message(&response),
        });
    }
    if response.status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(&response.body)?)
}

fn error_message(response: &RawResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) {
        if let Some(Value::String(message)) = obj.get("error") {
            return message.clone();
        }
    }
    if !text.is_empty() {
        return text.to_string();
    }
    if !response.reason.is_empty() {
        return response.reason.clone();
    }
    format!("HTTP {}", response.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, reason: &str, body: &str) -> RawResponse {
        RawResponse {
            status,
            reason: reason.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_decode_json_body() {
        let value = decode(response(200, "OK", r#"{"projectName":"demo"}"#)).unwrap();
        assert_eq!(value, json!({"projectName": "demo"}));
    }

    #[test]
    fn test_decode_no_content_and_empty_body() {
        assert_eq!(
            decode(response(204, "No Content", "")).unwrap(),
            json!({})
        );
        assert_eq!(decode(response(200, "OK", "")).unwrap(), json!({}));
        assert_eq!(decode(response(200, "OK", " \n")).unwrap(), json!({}));
    }

    #[test]
    fn test_decode_api_error_messages() {
        let err = decode(response(404, "Not Found", "")).unwrap_err();
        assert!(matches!(
            err,
            Error::Api { status: 404, ref message } if message == "Not Found"
        ));

        let err = decode(response(400, "Bad Request", r#"{"error":"process web not found"}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Api { status: 400, ref message } if message == "process web not found"
        ));

        let err = decode(response(500, "", "boom")).unwrap_err();
        assert_eq!(err.to_string(), "API error 500: boom");

        let err = decode(response(503, "", "")).unwrap_err();
        assert_eq!(err.to_string(), "API error 503: HTTP 503");
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode(response(200, "OK", "not json")).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_null_lists_read_as_empty() {
        let ports: ProcessPorts = serde_json::from_value(
            json!({"name": "web", "tcp_ports": [8080], "udp_ports": null}),
        )
        .unwrap();
        assert_eq!(ports.tcp_ports, vec![8080]);
        assert!(ports.udp_ports.is_empty());

        let ports: ProcessPorts =
            serde_json::from_value(json!({"name": "web", "tcp_ports": null})).unwrap();
        assert_eq!(ports, ProcessPorts { name: "web".into(), ..ProcessPorts::default() });

        let logs: LogsResponse = serde_json::from_value(json!({"logs": null})).unwrap();
        assert!(logs.logs.is_empty());

        let state: ProcessesState = serde_json::from_value(json!({"data": null})).unwrap();
        assert!(state.data.is_empty());
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode("web server"), "web%20server");
        assert_eq!(encode("a/b"), "a%2Fb");
        assert_eq!(encode("plain"), "plain");
    }

    #[test]
    fn test_client_defaults() {
        let client = ProcessComposeClient::new(&Endpoint::loopback(8080)).unwrap();
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(client.endpoint(), Endpoint::loopback(8080));

        let client = client.with_timeout(Duration::from_millis(5));
        assert_eq!(client.timeout(), Duration::from_millis(5));
    }
}
