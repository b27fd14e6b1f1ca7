//! Fan-out of event records to append-only sinks.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{EventRecord, Severity};

/// Logging section of the scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub logging_targets: Vec<SinkConfig>,
}

/// One configured log destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    pub logging_target_type: SinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_target_filename: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SinkFilter>,
}

impl SinkConfig {
    pub fn file(path: impl Into<PathBuf>, filter: Option<SinkFilter>) -> Self {
        Self {
            logging_target_type: SinkType::File,
            logging_target_filename: Some(path.into()),
            filter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    File,
    Console,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkFilter {
    /// Only records whose `success` flag is false.
    #[serde(rename = "successFalse")]
    SuccessFalse,
    /// Any other filter name; the sink receives every record.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Destination {
    File(PathBuf),
    Console,
}

#[derive(Debug, Clone)]
struct Sink {
    destination: Destination,
    failures_only: bool,
}

impl Sink {
    fn accepts(&self, record: &EventRecord) -> bool {
        !(self.failures_only && record.success)
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        match &self.destination {
            Destination::File(path) => append_line(path, line),
            Destination::Console => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(line.as_bytes())?;
                stdout.flush()
            }
        }
    }

    fn describe(&self) -> String {
        match &self.destination {
            Destination::File(path) => path.display().to_string(),
            Destination::Console => "console".to_string(),
        }
    }
}

/// Append one line with a single write on an `O_APPEND` handle.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

/// Outcome of [`EventLogger::begin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeginStatus {
    pub success: bool,
    pub message: String,
}

/// Process-wide event logger.
///
/// The sink list is fixed at construction; `log` only reads it.
#[derive(Debug, Clone, Default)]
pub struct EventLogger {
    sinks: Vec<Sink>,
}

impl EventLogger {
    /// Build the sink list and write a startup record to every file sink.
    ///
    /// Never fails: problems are reported through the returned status so the
    /// caller can decide whether to abort.
    pub fn begin(config: &LoggingConfig) -> (Self, BeginStatus) {
        let mut sinks = Vec::new();
        let mut problems = Vec::new();

        for sink_config in &config.logging_targets {
            let failures_only = sink_config.filter == Some(SinkFilter::SuccessFalse);
            match sink_config.logging_target_type {
                SinkType::File => match &sink_config.logging_target_filename {
                    Some(path) => sinks.push(Sink {
                        destination: Destination::File(path.clone()),
                        failures_only,
                    }),
                    None => problems.push("file sink without loggingTargetFilename".to_string()),
                },
                SinkType::Console => sinks.push(Sink {
                    destination: Destination::Console,
                    failures_only,
                }),
                SinkType::Unsupported => {
                    tracing::warn!("Ignoring logging target of unsupported type");
                }
            }
        }

        let started = EventRecord::new(
            true,
            Severity::Info,
            format!("RPCM test scheduler {} has started", env!("CARGO_PKG_VERSION")),
        );
        match started.to_line() {
            Ok(line) => {
                for sink in &sinks {
                    if let Destination::File(path) = &sink.destination {
                        if let Err(e) = append_line(path, &line) {
                            problems.push(format!("failed to open log file {}: {}", path.display(), e));
                        }
                    }
                }
            }
            Err(e) => problems.push(format!("failed to encode startup record: {}", e)),
        }

        let status = if problems.is_empty() {
            BeginStatus {
                success: true,
                message: format!("logging to {} sink(s)", sinks.len()),
            }
        } else {
            BeginStatus {
                success: false,
                message: format!("RPCM test scheduler failed to start: {}", problems.join("; ")),
            }
        };

        (Self { sinks }, status)
    }

    /// Stamp `record` with the current time and append it to every sink whose
    /// filter accepts it, in configuration order.
    pub fn log(&self, mut record: EventRecord) {
        record.datetime = chrono::Utc::now();

        let line = match record.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode event record: {}", e);
                return;
            }
        };

        for sink in self.sinks.iter().filter(|s| s.accepts(&record)) {
            if let Err(e) = sink.append(&line) {
                tracing::error!("Failed to write in log file {}: {}", sink.describe(), e);
            }
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
