// ── Subscription filters ──
//
// Per-device reduction of context updates before they reach the sink.

use serde::{Deserialize, Serialize};

use crate::model::ContextUpdate;

/// Which context fields a device delivers to the sink.
///
/// Defaults to everything. A field whose flag is off is cleared from the
/// update; an update left with nothing is not delivered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SubscriptionFilter {
    pub recording: bool,
    pub battery: bool,
    pub ptz: bool,
    pub temperature: bool,
    pub storage: bool,
    pub mode: bool,
    pub camera_info: bool,
    /// Fields without a typed counterpart (`extra`).
    pub other: bool,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl SubscriptionFilter {
    pub const fn all() -> Self {
        Self {
            recording: true,
            battery: true,
            ptz: true,
            temperature: true,
            storage: true,
            mode: true,
            camera_info: true,
            other: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            recording: false,
            battery: false,
            ptz: false,
            temperature: false,
            storage: false,
            mode: false,
            camera_info: false,
            other: false,
        }
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    /// Clear every field this filter excludes. `None` if nothing is left.
    pub fn apply(&self, mut update: ContextUpdate) -> Option<ContextUpdate> {
        if !self.recording {
            update.recording = None;
        }
        if !self.battery {
            update.battery = None;
        }
        if !self.ptz {
            update.ptz = None;
        }
        if !self.temperature {
            update.temperature = None;
        }
        if !self.storage {
            update.storage = None;
        }
        if !self.mode {
            update.mode = None;
        }
        if !self.camera_info {
            update.camera_info = None;
        }
        if !self.other {
            update.extra.clear();
        }

        (!update.is_empty()).then_some(update)
    }
}
