//! Event records persisted to the append-only log sinks.
//!
//! Every record is one self-contained JSON object on its own line.

mod logger;

pub use logger::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::{Target, Telemetry};

/// Record severity as written to the `severity` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Alert,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Alert => write!(f, "alert"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Error classification codes carried in the `errorCode` field.
///
/// The numeric values are a stable taxonomy shared with everything that reads
/// the logs; never renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ErrorCode {
    Success = 0,
    RequestTimeout = 1,
    TransportError = 2,
    PowerOnRejected = 3,
    PowerOnStateDivergence = 4,
    OutletOffExpectedOn = 5,
    PowerOffStateDivergence = 6,
    OutletOnExpectedOff = 7,
    PowerOffRejected = 8,
    RecognitionOnRejected = 9,
    RecognitionOffExpectedOn = 10,
    RecognitionOffRejected = 11,
    RecognitionOnExpectedOff = 12,
    RetryScheduled = 13,
    AttemptsExhausted = 14,
    InterHostWait = 15,
    InterCheckWait = 16,
    UnknownTestKind = 17,
}

impl ErrorCode {
    const ALL: [ErrorCode; 18] = [
        ErrorCode::Success,
        ErrorCode::RequestTimeout,
        ErrorCode::TransportError,
        ErrorCode::PowerOnRejected,
        ErrorCode::PowerOnStateDivergence,
        ErrorCode::OutletOffExpectedOn,
        ErrorCode::PowerOffStateDivergence,
        ErrorCode::OutletOnExpectedOff,
        ErrorCode::PowerOffRejected,
        ErrorCode::RecognitionOnRejected,
        ErrorCode::RecognitionOffExpectedOn,
        ErrorCode::RecognitionOffRejected,
        ErrorCode::RecognitionOnExpectedOff,
        ErrorCode::RetryScheduled,
        ErrorCode::AttemptsExhausted,
        ErrorCode::InterHostWait,
        ErrorCode::InterCheckWait,
        ErrorCode::UnknownTestKind,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code.as_u8()
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ErrorCode::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown error code: {}", value))
    }
}

/// A single structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub datetime: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub message: String,
    pub severity: Severity,
    /// JSON-encoded error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tries_left: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_milliseconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

impl EventRecord {
    pub fn new(success: bool, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            datetime: Utc::now(),
            success,
            target: None,
            serial_name: None,
            test_type: None,
            error_code: None,
            message: message.into(),
            severity,
            error: None,
            tries_left: None,
            timeout_milliseconds: None,
            consecutive_failures: None,
            telemetry: None,
        }
    }

    /// A failure record for `target` classified by `code`.
    pub fn failure(target: &Target, code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self::new(false, severity, message).target(target).code(code)
    }

    pub fn target(mut self, target: &Target) -> Self {
        self.target = Some(target.host.clone());
        self
    }

    pub fn serial_name(mut self, serial_name: Option<String>) -> Self {
        self.serial_name = serial_name;
        self
    }

    pub fn test_type(mut self, test_type: impl Into<String>) -> Self {
        self.test_type = Some(test_type.into());
        self
    }

    pub fn code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn tries_left(mut self, tries_left: u32) -> Self {
        self.tries_left = Some(tries_left);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_milliseconds = Some(timeout.as_millis() as u64);
        self
    }

    pub fn consecutive_failures(mut self, count: u32) -> Self {
        self.consecutive_failures = Some(count);
        self
    }

    pub fn telemetry(mut self, telemetry: Option<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Encode as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
