//! Remote device access.
//!
//! [`DeviceApi`] is the seam between the test logic and the HTTPS transport;
//! [`RpcmClient`] is the production implementation.

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod models;

pub use client::*;
pub use models::*;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// A device under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// IP address or FQDN.
    pub host: String,
    pub api_key: String,
}

impl Target {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
        }
    }
}

/// Coarse class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Request,
    Body,
    Decode,
    Other,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "ConnectionFailed"),
            TransportKind::Request => write!(f, "RequestFailed"),
            TransportKind::Body => write!(f, "BodyFailed"),
            TransportKind::Decode => write!(f, "MalformedResponse"),
            TransportKind::Other => write!(f, "FetchFailed"),
        }
    }
}

/// Device request error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("{kind} for {path}: {message}")]
    Transport {
        kind: TransportKind,
        path: String,
        message: String,
    },
}

impl DeviceError {
    pub(crate) fn from_reqwest(e: reqwest::Error, uri: &str) -> Self {
        let kind = if e.is_connect() {
            TransportKind::Connect
        } else if e.is_decode() {
            TransportKind::Decode
        } else if e.is_body() {
            TransportKind::Body
        } else if e.is_request() {
            TransportKind::Request
        } else {
            TransportKind::Other
        };

        let e = e.without_url();
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }

        DeviceError::Transport {
            kind,
            path: uri.to_string(),
            message,
        }
    }

    /// Structured description written to the transport-failure record.
    ///
    /// Carries the volatile request `path` next to a `code`, which is what the
    /// analyzer strips when grouping.
    pub fn diagnostic_json(&self) -> Option<String> {
        match self {
            DeviceError::Timeout(_) => None,
            DeviceError::Transport { kind, path, message } => Some(
                json!({
                    "code": kind.to_string(),
                    "path": path,
                    "message": message,
                })
                .to_string(),
            ),
        }
    }

    /// Wrapper used as a test outcome's error payload when the request itself
    /// failed. The embedded `success` flag marks it as already reported.
    pub fn wrapped_json(&self) -> String {
        json!({ "success": false, "error": self.to_string() }).to_string()
    }
}

/// A single request against a device's management API.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Issue `method path` against `target`, abandoning the call after `timeout`.
    async fn request(
        &self,
        target: &Target,
        path: &str,
        method: Method,
        timeout: Duration,
    ) -> Result<Value, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_and_payloads() {
        let err = DeviceError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "request timed out after 1500 ms");
        assert!(err.diagnostic_json().is_none());

        let wrapped: Value = serde_json::from_str(&err.wrapped_json()).unwrap();
        assert_eq!(wrapped["success"], false);
        assert_eq!(wrapped["error"], "request timed out after 1500 ms");
    }

    #[test]
    fn test_transport_diagnostic_has_code_and_path() {
        let err = DeviceError::Transport {
            kind: TransportKind::Connect,
            path: "https://10.0.0.1:8443/api/outlet/9/on".to_string(),
            message: "connection refused".to_string(),
        };
        let diag: Value = serde_json::from_str(&err.diagnostic_json().unwrap()).unwrap();
        assert_eq!(diag["code"], "ConnectionFailed");
        assert_eq!(diag["path"], "https://10.0.0.1:8443/api/outlet/9/on");
        assert_eq!(diag["message"], "connection refused");
    }
}
