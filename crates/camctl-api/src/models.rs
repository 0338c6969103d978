// Control-plane reply shapes.
//
// Device replies are loosely typed JSON. `StatusReply` gives typed access
// to the fields every control endpoint shares and keeps the rest in
// `extra` so nothing the firmware sends is lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed view of a `{ "code": 0, "desc": "", "msg": "..." }` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    /// Numeric status, `0` on success. `None` if the reply carried none.
    #[serde(default)]
    pub code: Option<i64>,

    #[serde(default)]
    pub desc: Option<String>,

    /// Value payload: current mode for mode queries, setting value for gets.
    #[serde(default)]
    pub msg: Option<String>,

    /// All remaining fields the device sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusReply {
    /// Interpret an arbitrary decoded reply.
    ///
    /// Non-object replies (including the `{success, data}` wrapper for
    /// plain-text bodies) yield a reply without a code, which is not ok.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self {
                code: None,
                desc: None,
                msg: None,
                extra: Map::new(),
            };
        };

        let mut extra = map.clone();
        let code = extra.remove("code").and_then(|v| v.as_i64());
        let desc = extra
            .remove("desc")
            .and_then(|v| v.as_str().map(String::from));
        let msg = extra.remove("msg").and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        Self {
            code,
            desc,
            msg,
            extra,
        }
    }

    /// `true` iff the device acknowledged with code `0`.
    pub fn is_ok(&self) -> bool {
        self.code == Some(0)
    }
}

/// Mode transitions understood by `/ctrl/mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeAction {
    /// Enter recording mode.
    ToRecording,
    /// Enter standby.
    ToStandby,
    /// Leave standby and let the device pick its mode.
    ExitStandby,
}

impl ModeAction {
    /// The `action` query value for this transition.
    pub fn as_query(self) -> &'static str {
        match self {
            Self::ToRecording => "to_rec",
            Self::ToStandby => "to_standby",
            Self::ExitStandby => "exit_standby",
        }
    }
}
