//! Configuration module for the RPCM test scheduler.
//!
//! Loads a JSON configuration file, then applies environment overrides.
//! `//` and `/* */` comments are allowed in the file.

use json_comments::StripComments;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::device::Target;
use crate::events::{LoggingConfig, SinkType};
use crate::runner::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One device entry of the `targets` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub rpcm_ip_or_fqdn: String,
    pub rpcm_api_key: String,
    /// Resolved into a `TestKind` by the scheduler.
    pub test_type: String,
}

impl TargetConfig {
    pub fn target(&self) -> Target {
        Target::new(&self.rpcm_ip_or_fqdn, &self.rpcm_api_key)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Attempts per test before giving up (default: 3)
    #[serde(default = "default_retry_count")]
    pub retry_count_on_not_success: u32,
    /// Pause between failed attempts (default: 60000)
    #[serde(default = "default_inter_retry_ms")]
    pub inter_retry_milliseconds: u64,
    /// Per-request timeout (default: 10000)
    #[serde(default = "default_request_timeout_ms")]
    pub rpcm_api_request_timeout_milliseconds: u64,
    /// Pause between a command and its verification (default: 1000)
    #[serde(default = "default_settle_ms")]
    pub settle_milliseconds: u64,
    /// Pause after each target (default: 0)
    #[serde(default)]
    pub inter_host_scheduling_interval_milliseconds: u64,
    /// Pause after each full pass over the targets (default: 60)
    #[serde(default = "default_inter_check_minutes")]
    pub inter_check_interval_minutes: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_retry_count() -> u32 {
    3
}

fn default_inter_retry_ms() -> u64 {
    60_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_settle_ms() -> u64 {
    1_000
}

fn default_inter_check_minutes() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            retry_count_on_not_success: default_retry_count(),
            inter_retry_milliseconds: default_inter_retry_ms(),
            rpcm_api_request_timeout_milliseconds: default_request_timeout_ms(),
            settle_milliseconds: default_settle_ms(),
            inter_host_scheduling_interval_milliseconds: 0,
            inter_check_interval_minutes: default_inter_check_minutes(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from `path`, then environment variables.
    ///
    /// Environment variables:
    /// - `RPCM_RETRY_COUNT`: attempts per test
    /// - `RPCM_INTER_RETRY_MS`: pause between failed attempts
    /// - `RPCM_REQUEST_TIMEOUT_MS`: per-request timeout
    /// - `RPCM_SETTLE_MS`: pause between command and verification
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut cfg = Self::parse(&text)?;
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration text, ignoring comments.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(StripComments::new(text.as_bytes()))?)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(count) = number(&lookup, "RPCM_RETRY_COUNT") {
            match u32::try_from(count) {
                Ok(count) => self.retry_count_on_not_success = count,
                Err(_) => tracing::warn!("Ignoring out of range RPCM_RETRY_COUNT={}", count),
            }
        }
        if let Some(ms) = number(&lookup, "RPCM_INTER_RETRY_MS") {
            self.inter_retry_milliseconds = ms;
        }
        if let Some(ms) = number(&lookup, "RPCM_REQUEST_TIMEOUT_MS") {
            self.rpcm_api_request_timeout_milliseconds = ms;
        }
        if let Some(ms) = number(&lookup, "RPCM_SETTLE_MS") {
            self.settle_milliseconds = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_count_on_not_success == 0 {
            return Err(ConfigError::Invalid(
                "retryCountOnNotSuccess must be at least 1".to_string(),
            ));
        }

        for (i, target) in self.targets.iter().enumerate() {
            if target.rpcm_ip_or_fqdn.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("target {} has an empty rpcmIpOrFqdn", i)));
            }
        }

        for sink in &self.logging.logging_targets {
            if sink.logging_target_type == SinkType::File && sink.logging_target_filename.is_none() {
                return Err(ConfigError::Invalid(
                    "file logging target requires loggingTargetFilename".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_count_on_not_success,
            retry_delay: Duration::from_millis(self.inter_retry_milliseconds),
            request_timeout: Duration::from_millis(self.rpcm_api_request_timeout_milliseconds),
            settle_delay: Duration::from_millis(self.settle_milliseconds),
        }
    }

    pub fn inter_host_interval(&self) -> Duration {
        Duration::from_millis(self.inter_host_scheduling_interval_milliseconds)
    }

    pub fn inter_check_interval(&self) -> Duration {
        Duration::from_secs(self.inter_check_interval_minutes.saturating_mul(60))
    }
}

fn number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(n) => {
            tracing::info!("Using {}={} from environment", key, n);
            Some(n)
        }
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "targets": [
            {"rpcmIpOrFqdn": "10.0.0.1", "rpcmApiKey": "k1", "testType": "powerOnOff"},
            {"rpcmIpOrFqdn": "rpcm-2.lab", "rpcmApiKey": "k2", "testType": "recognitionOnOff"}
        ],
        "retryCountOnNotSuccess": 5,
        "interRetryMilliseconds": 30000,
        "interHostSchedulingIntervalMilliseconds": 2000,
        "interCheckIntervalMinutes": 15,
        "logging": {
            "loggingTargets": [
                {"loggingTargetType": "file", "loggingTargetFilename": "/var/log/rpcm.log"},
                {"loggingTargetType": "file", "loggingTargetFilename": "/var/log/rpcm-fail.log", "filter": "successFalse"}
            ]
        }
    }"#;

    #[test]
    fn test_default_config() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.retry_count_on_not_success, 3);
        assert_eq!(cfg.inter_retry_milliseconds, 60_000);
        assert_eq!(cfg.rpcm_api_request_timeout_milliseconds, 10_000);
        assert_eq!(cfg.settle_milliseconds, 1_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let cfg = SchedulerConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.targets.len(), 2);
        assert_eq!(cfg.targets[1].target(), Target::new("rpcm-2.lab", "k2"));
        assert_eq!(cfg.logging.logging_targets.len(), 2);

        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_delay, Duration::from_secs(30));
        // Unset keys fall back to defaults.
        assert_eq!(policy.request_timeout, Duration::from_secs(10));
        assert_eq!(policy.settle_delay, Duration::from_secs(1));
        assert_eq!(cfg.inter_host_interval(), Duration::from_secs(2));
        assert_eq!(cfg.inter_check_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_validation() {
        let mut cfg = SchedulerConfig::parse(SAMPLE).unwrap();
        cfg.retry_count_on_not_success = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = SchedulerConfig::parse(
            r#"{"targets":[{"rpcmIpOrFqdn":" ","rpcmApiKey":"k","testType":"powerOnOff"}]}"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = SchedulerConfig::parse(r#"{"logging":{"loggingTargets":[{"loggingTargetType":"file"}]}}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = tokio_test::assert_ok!(SchedulerConfig::load(file.path()));
        assert_eq!(cfg.targets[0].test_type, "powerOnOff");
    }

    #[test]
    fn test_load_config_with_comments() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                // devices under test
                "targets": [
                    {"rpcmIpOrFqdn": "10.0.0.1", "rpcmApiKey": "k1", "testType": "powerOnOff"}
                ],
                /* retry tuning,
                   in milliseconds */
                "interRetryMilliseconds": 1500,
                "note": "keys live in // the vault" /* trailing */
            }"#,
        )
        .unwrap();
        let cfg = tokio_test::assert_ok!(SchedulerConfig::load(file.path()));
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.inter_retry_milliseconds, 1500);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RPCM_RETRY_COUNT", "7"),
            ("RPCM_INTER_RETRY_MS", "250"),
            ("RPCM_SETTLE_MS", "soon"),
        ]
        .into_iter()
        .collect();
        let mut cfg = SchedulerConfig::default();
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.retry_count_on_not_success, 7);
        assert_eq!(cfg.inter_retry_milliseconds, 250);
        // Unparseable values leave the setting alone.
        assert_eq!(cfg.settle_milliseconds, 1_000);
    }

    #[test]
    fn test_out_of_range_values_do_not_wrap() {
        let mut cfg = SchedulerConfig::default();
        cfg.apply_overrides(|key| (key == "RPCM_RETRY_COUNT").then(|| "4294967297".to_string()));
        assert_eq!(cfg.retry_count_on_not_success, 3);

        cfg.inter_check_interval_minutes = u64::MAX;
        assert_eq!(cfg.inter_check_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_load_errors() {
        tokio_test::assert_err!(SchedulerConfig::load(Path::new("/nonexistent/config.json")));
        assert!(matches!(SchedulerConfig::parse("{ not json"), Err(ConfigError::Parse(_))));
    }
}
