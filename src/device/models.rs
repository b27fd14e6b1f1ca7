//! Device API body types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outlet channel exercised by every test.
pub const OUTLET_CHANNEL: &str = "9";

pub const STATUS_PATH: &str = "/api/cachedStatusWithFullNames";

/// Value of `rOLC` when the device accepted a command.
pub const COMMAND_OK: &str = "OK";

/// ON/OFF reading of an outlet field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchState::On => write!(f, "ON"),
            SwitchState::Off => write!(f, "OFF"),
            SwitchState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// `ats.channels[n]` of the status body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    #[serde(default)]
    pub admin_state: Option<SwitchState>,
    #[serde(default)]
    pub actual_state: Option<SwitchState>,
    #[serde(default)]
    pub recognition_state: Option<SwitchState>,
}

/// Secondary telemetry from the status body, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llc_resets_count: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts_count: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc_boot: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<Value>,
}

impl Telemetry {
    pub fn is_empty(&self) -> bool {
        *self == Telemetry::default()
    }
}

/// What a status query revealed about the channel under test.
///
/// Every part is optional; a missing channel means the state is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutletSnapshot {
    pub serial_name: Option<String>,
    pub channel: Option<ChannelStatus>,
    /// The channel object exactly as the device sent it.
    pub raw_channel: Option<Value>,
    pub telemetry: Telemetry,
}

impl OutletSnapshot {
    pub fn from_status(body: &Value, channel: &str) -> Self {
        let raw_channel = body
            .get("ats")
            .and_then(|ats| ats.get("channels"))
            .and_then(|channels| channels.get(channel))
            .filter(|c| c.is_object())
            .cloned();
        let parsed = raw_channel
            .as_ref()
            .and_then(|c| serde_json::from_value::<ChannelStatus>(c.clone()).ok());

        Self {
            serial_name: body.get("serialName").and_then(Value::as_str).map(str::to_string),
            channel: parsed,
            raw_channel,
            telemetry: serde_json::from_value(body.clone()).unwrap_or_default(),
        }
    }

    /// The channel exists and its raw `adminState` and `actualState` differ.
    /// An absent field counts as a value of its own.
    pub fn power_states_diverge(&self) -> bool {
        match &self.raw_channel {
            Some(channel) => channel.get("adminState") != channel.get("actualState"),
            None => false,
        }
    }

    pub fn admin_state(&self) -> Option<SwitchState> {
        self.channel.as_ref().and_then(|c| c.admin_state)
    }

    pub fn actual_state(&self) -> Option<SwitchState> {
        self.channel.as_ref().and_then(|c| c.actual_state)
    }

    pub fn recognition_state(&self) -> Option<SwitchState> {
        self.channel.as_ref().and_then(|c| c.recognition_state)
    }

    pub fn telemetry(&self) -> Option<Telemetry> {
        if self.telemetry.is_empty() {
            None
        } else {
            Some(self.telemetry.clone())
        }
    }
}

/// The `rOLC` field of a command response, if present.
pub fn last_command_result(body: &Value) -> Option<&str> {
    body.get("rOLC").and_then(Value::as_str)
}
