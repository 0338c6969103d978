//! Device event stream transport.
//!
//! Opens the device's WebSocket status channel (port 81 by default) and
//! decodes its text frames. Each text frame carries one or more
//! newline-delimited JSON objects tagged by a `type` field. Decoding is a
//! closed step: every object becomes a [`DeviceFrame`] variant, with
//! [`DeviceFrame::Unknown`] catching anything the firmware adds later.
//!
//! Connection lifecycle (reconnects, heartbeats, fan-out) belongs to the
//! subscription manager in `camctl-core`; this module only knows how to
//! open one socket and read its frames.
//!
//! # Example
//!
//! ```rust,ignore
//! use camctl_api::stream::{open_stream, stream_url, decode_frames};
//! use futures_util::StreamExt;
//!
//! let url = stream_url("192.168.1.50", 81)?;
//! let mut socket = open_stream(&url, std::time::Duration::from_secs(10)).await?;
//! while let Some(Ok(msg)) = socket.next().await {
//!     if let Ok(text) = msg.to_text() {
//!         for frame in decode_frames(text).into_iter().flatten() {
//!             println!("{:?}", frame.kind());
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::transport::USER_AGENT;

/// Default port of the status channel.
pub const DEFAULT_STREAM_PORT: u16 = 81;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An open status channel.
pub type DeviceSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── Connecting ───────────────────────────────────────────────────────

/// `ws://{host}:{port}/`
pub fn stream_url(host: &str, port: u16) -> Result<Url, Error> {
    Ok(Url::parse(&format!("ws://{host}:{port}/"))?)
}

/// Open the status channel, giving up after `timeout`.
pub async fn open_stream(url: &Url, timeout: Duration) -> Result<DeviceSocket, Error> {
    tracing::debug!(url = %url, "opening event stream");

    let uri: tungstenite::http::Uri =
        url.as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Stream {
                message: e.to_string(),
                url: url.to_string(),
            })?;

    let request = ClientRequestBuilder::new(uri).with_header("User-Agent", USER_AGENT);

    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
        Ok(Ok((socket, _response))) => {
            tracing::debug!(url = %url, "event stream open");
            Ok(socket)
        }
        Ok(Err(e)) => Err(Error::Stream {
            message: e.to_string(),
            url: url.to_string(),
        }),
        Err(_) => Err(Error::StreamTimeout {
            url: url.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

// ── Frames ───────────────────────────────────────────────────────────

/// Discriminant of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Heartbeat,
    Status,
    CameraInfo,
    Unknown,
}

/// One decoded object from the status channel.
///
/// Tagged variants keep the full decoded object, `type` included, so the
/// raw payload can be recorded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceFrame {
    /// `{"type":"heartbeat"}`
    Heartbeat(Map<String, Value>),
    /// `{"type":"status", ...fields}`: a status delta.
    Status(Map<String, Value>),
    /// `{"type":"camera_info", ...fields}`: identity/capability block.
    CameraInfo(Map<String, Value>),
    /// Valid JSON with a missing or unrecognized `type`.
    Unknown(Value),
}

impl DeviceFrame {
    /// Classify a decoded JSON value.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::Unknown(value);
        };

        match map.get("type").and_then(Value::as_str) {
            Some("heartbeat") => Self::Heartbeat(map),
            Some("status") => Self::Status(map),
            Some("camera_info") => Self::CameraInfo(map),
            _ => Self::Unknown(Value::Object(map)),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Heartbeat(_) => FrameKind::Heartbeat,
            Self::Status(_) => FrameKind::Status,
            Self::CameraInfo(_) => FrameKind::CameraInfo,
            Self::Unknown(_) => FrameKind::Unknown,
        }
    }

    /// The raw decoded payload.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Heartbeat(map) | Self::Status(map) | Self::CameraInfo(map) => {
                Value::Object(map.clone())
            }
            Self::Unknown(value) => value.clone(),
        }
    }
}

/// Decode every non-blank line of a text frame.
///
/// Lines are decoded independently so one malformed object does not cost
/// the rest of the frame.
pub fn decode_frames(text: &str) -> Vec<Result<DeviceFrame, serde_json::Error>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Value>(line).map(DeviceFrame::from_value))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
