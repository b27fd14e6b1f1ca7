//! Offline log analysis.
//!
//! Folds an event log into per-target statistics and per-error target sets in
//! a single pass. Lines that are not JSON objects are ignored.

mod canonical;
mod report;

pub use canonical::*;
pub use report::*;

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("failed to read log: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub line_count: u64,
    /// Distinct serial names in first-seen order.
    pub serial_names: Vec<String>,
}

/// Which of the three disjoint health classes a target falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    SuccessOnly,
    FailureOnly,
    Mixed,
}

impl TargetStats {
    /// `None` only for a target with no success/failure observations.
    pub fn class(&self) -> Option<TargetClass> {
        match (self.success_count > 0, self.failure_count > 0) {
            (true, false) => Some(TargetClass::SuccessOnly),
            (false, true) => Some(TargetClass::FailureOnly),
            (true, true) => Some(TargetClass::Mixed),
            (false, false) => None,
        }
    }
}

/// The subset of a log line the aggregator looks at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoggedEvent {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    target: Option<Value>,
    #[serde(default)]
    serial_name: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// JavaScript truthiness of a JSON value; an absent value is false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Accumulated analyzer state.
#[derive(Debug, Default)]
pub struct LogAggregator {
    policy: PathStripPolicy,
    targets: BTreeMap<String, TargetStats>,
    /// Serial name -> targets in first-seen order.
    serial_targets: BTreeMap<String, Vec<String>>,
    /// Canonical error -> target -> occurrences.
    errors: BTreeMap<String, BTreeMap<String, u64>>,
}

impl LogAggregator {
    pub fn new(policy: PathStripPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Fold one line. Returns whether it was a usable record.
    pub fn ingest_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if !line.starts_with('{') {
            return false;
        }
        let event: LoggedEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(_) => return false,
        };
        let target = match event.target.as_ref().and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return false,
        };
        let success = truthy(event.success.as_ref());

        let stats = self.targets.entry(target.clone()).or_default();
        stats.line_count += 1;
        if success {
            stats.success_count += 1;
        } else {
            stats.failure_count += 1;
        }

        let serial_name = event.serial_name.as_ref().and_then(Value::as_str).filter(|s| !s.is_empty());
        if let Some(serial) = serial_name.map(str::to_string) {
            if !stats.serial_names.contains(&serial) {
                stats.serial_names.push(serial.clone());
            }
            let targets = self.serial_targets.entry(serial).or_default();
            if !targets.contains(&target) {
                targets.push(target.clone());
            }
        }

        if success {
            return true;
        }
        let policy = self.policy;
        let canonical = event
            .error
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|e| canonicalize(e, policy));
        if let Some(Canonical::Key(key)) = canonical {
            *self.errors.entry(key).or_default().entry(target).or_insert(0) += 1;
        }
        true
    }

    /// Fold every line of `reader`. Lines that are not valid UTF-8 are skipped.
    pub fn ingest_reader<R: BufRead>(&mut self, mut reader: R) -> Result<(), AnalyzeError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            if let Ok(line) = std::str::from_utf8(&buf) {
                self.ingest_line(line);
            }
        }
    }

    pub fn ingest_file(&mut self, path: &Path) -> Result<(), AnalyzeError> {
        let file = std::fs::File::open(path)?;
        self.ingest_reader(std::io::BufReader::new(file))
    }

    pub fn targets(&self) -> &BTreeMap<String, TargetStats> {
        &self.targets
    }

    pub fn target(&self, target: &str) -> Option<&TargetStats> {
        self.targets.get(target)
    }

    pub fn serial_targets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.serial_targets
    }

    pub fn errors(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.errors
    }

    /// Number of targets in `class`.
    pub fn class_count(&self, class: TargetClass) -> usize {
        self.targets.values().filter(|s| s.class() == Some(class)).count()
    }
}
