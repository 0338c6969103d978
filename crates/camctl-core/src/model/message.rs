use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub use camctl_api::FrameKind as MessageKind;
use camctl_api::DeviceFrame;

/// One frame received on a device's event stream, as recorded in history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    pub received_at: DateTime<Utc>,
    pub kind: MessageKind,
    /// The decoded frame, verbatim.
    pub payload: Value,
}

impl InboundMessage {
    pub fn from_frame(frame: &DeviceFrame) -> Self {
        Self {
            received_at: Utc::now(),
            kind: frame.kind(),
            payload: frame.to_value(),
        }
    }
}
