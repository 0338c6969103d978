use std::str::FromStr;

use camctl_api::ModeAction;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::CoreError;

/// Device-side behavior requested when acquiring control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlMode {
    Recording,
    Standby,
    /// Out of standby, device picks its own mode.
    Auto,
}

impl ControlMode {
    /// The `/ctrl/mode` transition that enters this mode.
    pub fn action(self) -> ModeAction {
        match self {
            Self::Recording => ModeAction::ToRecording,
            Self::Standby => ModeAction::ToStandby,
            Self::Auto => ModeAction::ExitStandby,
        }
    }

    /// Whether the mode the device reports (`msg` of a mode query)
    /// already satisfies this mode.
    pub fn matches_reported(self, reported: &str) -> bool {
        let reported = reported.trim().to_ascii_lowercase();
        match self {
            Self::Recording => reported.starts_with("rec") && !reported.contains("standby"),
            Self::Standby => reported.contains("standby"),
            Self::Auto => !reported.is_empty() && !reported.contains("standby"),
        }
    }
}

impl FromStr for ControlMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recording" | "rec" => Ok(Self::Recording),
            "standby" => Ok(Self::Standby),
            "auto" => Ok(Self::Auto),
            _ => Err(CoreError::UnsupportedControlMode { mode: s.to_owned() }),
        }
    }
}

/// Lease state machine as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlState {
    Uncontrolled,
    Acquiring,
    Controlled,
    /// Was controlled, but the lease lapsed or a heartbeat failed.
    Expired,
}
