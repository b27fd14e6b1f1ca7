//! HTTPS client for the RPCM management API.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{DeviceApi, DeviceError, Target};
use crate::events::{ErrorCode, EventLogger, EventRecord, Severity};

pub const API_KEY_HEADER: &str = "API-KEY";

/// Scheme and port of the management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: 8443,
        }
    }
}

impl Endpoint {
    pub fn uri(&self, host: &str, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme, host, self.port, path)
    }
}

/// Production [`DeviceApi`] backed by `reqwest`.
pub struct RpcmClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    logger: Arc<EventLogger>,
}

impl RpcmClient {
    /// Create a client for the standard HTTPS endpoint.
    ///
    /// Certificate validation is disabled: the devices serve self-signed
    /// certificates, and the API key header is the only trust anchor.
    pub fn new(logger: Arc<EventLogger>) -> Result<Self, reqwest::Error> {
        Self::with_endpoint(logger, Endpoint::default())
    }

    pub fn with_endpoint(logger: Arc<EventLogger>, endpoint: Endpoint) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { http, endpoint, logger })
    }

    fn report(&self, target: &Target, error: &DeviceError) {
        let record = match error {
            DeviceError::Timeout(timeout) => EventRecord::failure(
                target,
                ErrorCode::RequestTimeout,
                Severity::Warning,
                format!("RPCM request timeout more than {} ms", timeout.as_millis()),
            )
            .timeout(*timeout),
            DeviceError::Transport { .. } => {
                EventRecord::failure(target, ErrorCode::TransportError, Severity::Alert, "RPCM request failed")
                    .error(error.diagnostic_json())
            }
        };
        self.logger.log(record);
    }
}

#[async_trait]
impl DeviceApi for RpcmClient {
    async fn request(
        &self,
        target: &Target,
        path: &str,
        method: Method,
        timeout: Duration,
    ) -> Result<Value, DeviceError> {
        let uri = self.endpoint.uri(&target.host, path);

        let call = async {
            let response = self
                .http
                .request(method, uri.as_str())
                .header(API_KEY_HEADER, &target.api_key)
                .send()
                .await?;
            response.json::<Value>().await
        };

        // A response that is already complete wins over an expired deadline;
        // on expiry the in-flight call is dropped and never observed.
        let error = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(body)) => return Ok(body),
            Ok(Err(e)) => DeviceError::from_reqwest(e, &uri),
            Err(_) => DeviceError::Timeout(timeout),
        };

        tracing::debug!("Request to {} failed: {}", uri, error);
        self.report(target, &error);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{TransportKind, STATUS_PATH};
    use crate::events::{LoggingConfig, SinkConfig};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn logger_in(dir: &TempDir) -> (Arc<EventLogger>, PathBuf) {
        let path = dir.path().join("events.log");
        let config = LoggingConfig {
            logging_targets: vec![SinkConfig::file(&path, None)],
        };
        let (logger, _) = EventLogger::begin(&config);
        (Arc::new(logger), path)
    }

    /// Records after the startup line.
    fn logged(path: &Path) -> Vec<EventRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn plain_http(port: u16) -> Endpoint {
        Endpoint {
            scheme: "http".to_string(),
            port,
        }
    }

    /// Serve exactly one HTTP response with the given body.
    async fn serve_once(body: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (port, handle)
    }

    #[test]
    fn test_default_endpoint() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.uri("rpcm.local", "/api/outlet/9/on"), "https://rpcm.local:8443/api/outlet/9/on");
    }

    #[tokio::test]
    async fn test_successful_request_sends_api_key() {
        let dir = TempDir::new().unwrap();
        let (logger, path) = logger_in(&dir);
        let (port, server) = serve_once(r#"{"rOLC":"OK"}"#).await;
        let client = RpcmClient::with_endpoint(logger, plain_http(port)).unwrap();
        let target = Target::new("127.0.0.1", "secret-key");

        let body = client
            .request(&target, "/api/outlet/9/on", Method::PUT, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body["rOLC"], "OK");

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /api/outlet/9/on HTTP/1.1"));
        assert!(request.to_lowercase().contains("api-key: secret-key"));
        assert!(logged(&path).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_failure() {
        let dir = TempDir::new().unwrap();
        let (logger, path) = logger_in(&dir);
        let (port, _server) = serve_once("<html>not json</html>").await;
        let client = RpcmClient::with_endpoint(logger, plain_http(port)).unwrap();
        let target = Target::new("127.0.0.1", "k");

        let err = client
            .request(&target, STATUS_PATH, Method::GET, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Transport { .. }));

        let records = logged(&path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_code, Some(ErrorCode::TransportError));
        assert_eq!(records[0].target.as_deref(), Some("127.0.0.1"));
        let diag: Value = serde_json::from_str(records[0].error.as_deref().unwrap()).unwrap();
        assert!(diag["path"].as_str().unwrap().ends_with(STATUS_PATH));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let dir = TempDir::new().unwrap();
        let (logger, path) = logger_in(&dir);
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RpcmClient::with_endpoint(logger, plain_http(port)).unwrap();

        let err = client
            .request(&Target::new("127.0.0.1", "k"), STATUS_PATH, Method::GET, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            DeviceError::Transport { kind, .. } => assert_eq!(kind, TransportKind::Connect),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(logged(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_silent_device_times_out_once() {
        let dir = TempDir::new().unwrap();
        let (logger, path) = logger_in(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            // Accept and hold the connection without answering.
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let client = RpcmClient::with_endpoint(logger, plain_http(port)).unwrap();

        let err = client
            .request(&Target::new("127.0.0.1", "k"), STATUS_PATH, Method::GET, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::Timeout(Duration::from_millis(100)));

        let records = logged(&path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_code, Some(ErrorCode::RequestTimeout));
        assert_eq!(records[0].timeout_milliseconds, Some(100));
    }
}
