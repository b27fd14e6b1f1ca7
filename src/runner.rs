//! Retrying test runner.
//!
//! One invocation moves through `Attempting -> {Success, Retrying} -> ... ->
//! {Success, GaveUp}`; attempts run strictly one after another.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::device::{DeviceApi, Target};
use crate::events::{ErrorCode, EventLogger, EventRecord, Severity};
use crate::outlet::{OutletVerb, Sequencer, TestOutcome, DEFAULT_SETTLE_DELAY};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown test type: {0}")]
pub struct UnknownTestKind(pub String);

/// Which verb pair a composite test runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    PowerCycle,
    RecognitionCycle,
}

impl TestKind {
    pub fn name(&self) -> &'static str {
        match self {
            TestKind::PowerCycle => "powerOnOff",
            TestKind::RecognitionCycle => "recognitionOnOff",
        }
    }

    /// The two verbs run back to back; the second only if the first passed.
    pub fn verbs(&self) -> (OutletVerb, OutletVerb) {
        match self {
            TestKind::PowerCycle => (OutletVerb::PowerOn, OutletVerb::PowerOff),
            TestKind::RecognitionCycle => (OutletVerb::RecognitionOn, OutletVerb::RecognitionOff),
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestKind {
    type Err = UnknownTestKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "powerOnOff" => Ok(TestKind::PowerCycle),
            "recognitionOnOff" => Ok(TestKind::RecognitionCycle),
            other => Err(UnknownTestKind(other.to_string())),
        }
    }
}

/// Retry parameters for one test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Runs composite tests with bounded retry and reports through the event log.
pub struct TestRunner<'a, D: DeviceApi> {
    sequencer: Sequencer<'a, D>,
    logger: &'a EventLogger,
    policy: RetryPolicy,
}

impl<'a, D: DeviceApi> TestRunner<'a, D> {
    pub fn new(device: &'a D, logger: &'a EventLogger, policy: RetryPolicy) -> Self {
        let sequencer = Sequencer::new(device, logger, policy.request_timeout, policy.settle_delay);
        Self {
            sequencer,
            logger,
            policy,
        }
    }

    /// Resolve `test_type` and run it. An unknown type is reported once and
    /// consumes no attempt.
    pub async fn run_named(&self, target: &Target, test_type: &str) -> bool {
        match test_type.parse::<TestKind>() {
            Ok(kind) => self.run(target, kind).await,
            Err(e) => {
                self.report_unknown_kind(target, &e);
                false
            }
        }
    }

    pub fn report_unknown_kind(&self, target: &Target, error: &UnknownTestKind) {
        tracing::error!("Target {}: {}", target.host, error);
        self.logger.log(
            EventRecord::failure(target, ErrorCode::UnknownTestKind, Severity::Critical, "Wrong test type")
                .test_type(error.0.clone())
                .error(Some(serde_json::Value::String(error.to_string()).to_string())),
        );
    }

    /// Run `kind` against `target` until it passes or attempts run out.
    pub async fn run(&self, target: &Target, kind: TestKind) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut tries_left = max_attempts;
        let mut consecutive_failures = 0;

        loop {
            let outcome = self.attempt(target, kind).await;

            if outcome.success {
                self.logger.log(
                    EventRecord::new(true, Severity::Info, "this was a successful try")
                        .target(target)
                        .code(ErrorCode::Success)
                        .test_type(kind.name())
                        .serial_name(outcome.snapshot.serial_name.clone())
                        .telemetry(outcome.snapshot.telemetry())
                        .tries_left(tries_left)
                        .timeout(self.policy.request_timeout),
                );
                return true;
            }

            tries_left -= 1;
            consecutive_failures += 1;

            self.logger.log(
                EventRecord::failure(
                    target,
                    outcome.error_code,
                    Severity::Warning,
                    format!("{} attempt {} of {} failed", kind, consecutive_failures, max_attempts),
                )
                .test_type(kind.name())
                .serial_name(outcome.snapshot.serial_name.clone())
                .telemetry(outcome.snapshot.telemetry())
                .error(outcome.error.clone())
                .tries_left(tries_left)
                .timeout(self.policy.request_timeout),
            );

            if tries_left == 0 {
                break;
            }

            // No target field: the analyzer counts every targeted record.
            self.logger.log(
                EventRecord::new(
                    true,
                    Severity::Info,
                    format!(
                        "Retrying {} on {} in {} ms",
                        kind,
                        target.host,
                        self.policy.retry_delay.as_millis()
                    ),
                )
                .code(ErrorCode::RetryScheduled)
                .test_type(kind.name())
                .tries_left(tries_left),
            );
            tokio::time::sleep(self.policy.retry_delay).await;
        }

        self.logger.log(
            EventRecord::failure(
                target,
                ErrorCode::AttemptsExhausted,
                Severity::Critical,
                format!(
                    "{} test {} failed {} times in a row",
                    target.host, kind, consecutive_failures
                ),
            )
            .test_type(kind.name())
            .consecutive_failures(consecutive_failures)
            .timeout(self.policy.request_timeout),
        );
        tracing::warn!("Giving up on {} ({}) after {} attempts", target.host, kind, consecutive_failures);

        false
    }

    /// One composite attempt: the first verb, then after settling the second.
    async fn attempt(&self, target: &Target, kind: TestKind) -> TestOutcome {
        let (first, second) = kind.verbs();

        let outcome = self.sequencer.execute(target, first).await;
        if !outcome.success {
            return outcome;
        }

        tokio::time::sleep(self.sequencer.settle_delay()).await;
        self.sequencer.execute(target, second).await
    }
}
