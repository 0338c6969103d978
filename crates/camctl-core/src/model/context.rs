// ── Context updates ──
//
// The shape delivered to the application's context sink. Status frames
// from the event stream are translated field by field; anything without
// a typed home lands in `extra`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pan/tilt/zoom position. Devices often report only the axes that moved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PtzPosition {
    #[serde(default)]
    pub pan: Option<f64>,
    #[serde(default)]
    pub tilt: Option<f64>,
    #[serde(default)]
    pub zoom: Option<f64>,
}

impl PtzPosition {
    fn is_empty(&self) -> bool {
        self.pan.is_none() && self.tilt.is_none() && self.zoom.is_none()
    }
}

/// A status delta for one device, ready for the context sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextUpdate {
    pub device: String,
    pub received_at: DateTime<Utc>,
    pub recording: Option<bool>,
    pub battery: Option<f64>,
    pub ptz: Option<PtzPosition>,
    pub temperature: Option<f64>,
    pub storage: Option<Value>,
    pub mode: Option<String>,
    pub camera_info: Option<Map<String, Value>>,
    /// Fields with no typed counterpart.
    pub extra: Map<String, Value>,
}

impl ContextUpdate {
    fn empty(device: &str) -> Self {
        Self {
            device: device.to_owned(),
            received_at: Utc::now(),
            recording: None,
            battery: None,
            ptz: None,
            temperature: None,
            storage: None,
            mode: None,
            camera_info: None,
            extra: Map::new(),
        }
    }

    /// Translate a `{"type":"status", ...}` frame.
    pub fn from_status(device: &str, fields: &Map<String, Value>) -> Self {
        let mut update = Self::empty(device);
        let mut ptz = PtzPosition::default();

        for (key, value) in fields {
            match key.as_str() {
                "type" => {}
                "recording" | "is_recording" => update.recording = as_flag(value),
                "rec_state" => {
                    update.recording = value
                        .as_str()
                        .map(|s| matches!(s, "recording" | "rec" | "rec_ing"));
                }
                "battery" | "battery_level" => update.battery = as_number(value),
                "temperature" | "temp" => update.temperature = as_number(value),
                "storage" | "card" => update.storage = Some(value.clone()),
                "mode" => update.mode = value.as_str().map(String::from),
                "ptz" => {
                    if let Ok(pos) = serde_json::from_value::<PtzPosition>(value.clone()) {
                        ptz = pos;
                    }
                }
                "pan" => ptz.pan = as_number(value),
                "tilt" => ptz.tilt = as_number(value),
                "zoom" => ptz.zoom = as_number(value),
                _ => {
                    update.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if !ptz.is_empty() {
            update.ptz = Some(ptz);
        }
        update
    }

    /// Translate a `{"type":"camera_info", ...}` frame.
    pub fn from_camera_info(device: &str, fields: &Map<String, Value>) -> Self {
        let mut info = fields.clone();
        info.remove("type");
        let mut update = Self::empty(device);
        update.camera_info = Some(info);
        update
    }

    /// `true` if no field carries data.
    pub fn is_empty(&self) -> bool {
        self.recording.is_none()
            && self.battery.is_none()
            && self.ptz.is_none()
            && self.temperature.is_none()
            && self.storage.is_none()
            && self.mode.is_none()
            && self.camera_info.is_none()
            && self.extra.is_empty()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.as_str() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
