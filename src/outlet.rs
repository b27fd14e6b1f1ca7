//! Outlet command sequencing: command, settle, verify.

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::device::{last_command_result, DeviceApi, OutletSnapshot, SwitchState, Target, COMMAND_OK, OUTLET_CHANNEL, STATUS_PATH};
use crate::events::{ErrorCode, EventLogger, EventRecord, Severity};

/// Default pause between a command and the status check that verifies it.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// One command against the outlet under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletVerb {
    PowerOn,
    PowerOff,
    RecognitionOn,
    RecognitionOff,
}

/// Post-condition a verb must leave the outlet in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Administrative and actual state both equal the given state.
    Power(SwitchState),
    Recognition(SwitchState),
}

impl Expectation {
    pub fn is_met(&self, snapshot: &OutletSnapshot) -> bool {
        match *self {
            Expectation::Power(state) => {
                snapshot.admin_state() == Some(state) && snapshot.actual_state() == Some(state)
            }
            Expectation::Recognition(state) => snapshot.recognition_state() == Some(state),
        }
    }
}

impl OutletVerb {
    pub fn path(&self) -> String {
        match self {
            OutletVerb::PowerOn => format!("/api/outlet/{}/on", OUTLET_CHANNEL),
            OutletVerb::PowerOff => format!("/api/outlet/{}/off", OUTLET_CHANNEL),
            OutletVerb::RecognitionOn => format!("/api/outlet/{}/recognition/on", OUTLET_CHANNEL),
            OutletVerb::RecognitionOff => format!("/api/outlet/{}/recognition/off", OUTLET_CHANNEL),
        }
    }

    pub fn expectation(&self) -> Expectation {
        match self {
            OutletVerb::PowerOn => Expectation::Power(SwitchState::On),
            OutletVerb::PowerOff => Expectation::Power(SwitchState::Off),
            OutletVerb::RecognitionOn => Expectation::Recognition(SwitchState::On),
            OutletVerb::RecognitionOff => Expectation::Recognition(SwitchState::Off),
        }
    }

    pub fn rejected_code(&self) -> ErrorCode {
        match self {
            OutletVerb::PowerOn => ErrorCode::PowerOnRejected,
            OutletVerb::PowerOff => ErrorCode::PowerOffRejected,
            OutletVerb::RecognitionOn => ErrorCode::RecognitionOnRejected,
            OutletVerb::RecognitionOff => ErrorCode::RecognitionOffRejected,
        }
    }

    pub fn mismatch_code(&self) -> ErrorCode {
        match self {
            OutletVerb::PowerOn => ErrorCode::OutletOffExpectedOn,
            OutletVerb::PowerOff => ErrorCode::OutletOnExpectedOff,
            OutletVerb::RecognitionOn => ErrorCode::RecognitionOffExpectedOn,
            OutletVerb::RecognitionOff => ErrorCode::RecognitionOnExpectedOff,
        }
    }

    /// Code for the secondary admin/actual divergence record. Power verbs only.
    pub fn divergence_code(&self) -> Option<ErrorCode> {
        match self {
            OutletVerb::PowerOn => Some(ErrorCode::PowerOnStateDivergence),
            OutletVerb::PowerOff => Some(ErrorCode::PowerOffStateDivergence),
            _ => None,
        }
    }
}

/// Result of one verb or one composite test attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub success: bool,
    pub error_code: ErrorCode,
    pub snapshot: OutletSnapshot,
    /// JSON-encoded error payload.
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn passed(snapshot: OutletSnapshot) -> Self {
        Self {
            success: true,
            error_code: ErrorCode::Success,
            snapshot,
            error: None,
        }
    }

    pub fn failed(error_code: ErrorCode, snapshot: OutletSnapshot, error: Option<String>) -> Self {
        Self {
            success: false,
            error_code,
            snapshot,
            error,
        }
    }
}

fn describe(state: Option<SwitchState>) -> String {
    state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
}

/// Issues outlet commands and verifies their effect.
pub struct Sequencer<'a, D: DeviceApi> {
    device: &'a D,
    logger: &'a EventLogger,
    request_timeout: Duration,
    settle_delay: Duration,
}

impl<'a, D: DeviceApi> Sequencer<'a, D> {
    pub fn new(device: &'a D, logger: &'a EventLogger, request_timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            device,
            logger,
            request_timeout,
            settle_delay,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub async fn power_on(&self, target: &Target) -> TestOutcome {
        self.execute(target, OutletVerb::PowerOn).await
    }

    pub async fn power_off(&self, target: &Target) -> TestOutcome {
        self.execute(target, OutletVerb::PowerOff).await
    }

    pub async fn recognition_on(&self, target: &Target) -> TestOutcome {
        self.execute(target, OutletVerb::RecognitionOn).await
    }

    pub async fn recognition_off(&self, target: &Target) -> TestOutcome {
        self.execute(target, OutletVerb::RecognitionOff).await
    }

    /// Command, wait for the device to settle, then verify the post-condition.
    pub async fn execute(&self, target: &Target, verb: OutletVerb) -> TestOutcome {
        let command_path = verb.path();
        let command = self
            .device
            .request(target, &command_path, Method::PUT, self.request_timeout)
            .await;

        let accepted = matches!(&command, Ok(body) if last_command_result(body) == Some(COMMAND_OK));
        if !accepted {
            let (result, payload) = match &command {
                Ok(body) => (body.get("rOLC").map(Value::to_string), body.to_string()),
                Err(e) => (None, e.wrapped_json()),
            };
            self.logger.log(
                EventRecord::failure(
                    target,
                    verb.rejected_code(),
                    Severity::Alert,
                    format!("RPCM result of last command ({}) not OK", command_path),
                )
                .error(result),
            );
            return TestOutcome::failed(verb.rejected_code(), OutletSnapshot::default(), Some(payload));
        }

        tokio::time::sleep(self.settle_delay).await;

        let status = self
            .device
            .request(target, STATUS_PATH, Method::GET, self.request_timeout)
            .await;
        let (snapshot, status_error) = match &status {
            Ok(body) => (OutletSnapshot::from_status(body, OUTLET_CHANNEL), None),
            Err(e) => (OutletSnapshot::default(), Some(e.wrapped_json())),
        };

        let expectation = verb.expectation();
        if expectation.is_met(&snapshot) {
            return TestOutcome::passed(snapshot);
        }

        let payload = snapshot
            .raw_channel
            .as_ref()
            .map(|c| c.to_string())
            .or(status_error);

        if let Some(code) = verb.divergence_code() {
            if snapshot.power_states_diverge() {
                self.logger.log(
                    EventRecord::failure(
                        target,
                        code,
                        Severity::Warning,
                        "AdministrativeState and actualState are different",
                    )
                    .serial_name(snapshot.serial_name.clone())
                    .error(payload.clone()),
                );
            }
        }

        let (message, severity) = match expectation {
            Expectation::Power(required) => (
                format!(
                    "AdminState is {}, actualState is {}, but require {}",
                    describe(snapshot.admin_state()),
                    describe(snapshot.actual_state()),
                    required
                ),
                Severity::Alert,
            ),
            Expectation::Recognition(required) => (
                format!(
                    "RPCM recognition state is {}, but require {}",
                    describe(snapshot.recognition_state()),
                    required
                ),
                Severity::Warning,
            ),
        };
        self.logger.log(
            EventRecord::failure(target, verb.mismatch_code(), severity, message)
                .serial_name(snapshot.serial_name.clone())
                .error(payload.clone()),
        );

        TestOutcome::failed(verb.mismatch_code(), snapshot, payload)
    }
}
