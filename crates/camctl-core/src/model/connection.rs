use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

/// Lifecycle of one device's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic reconnection exhausted; only an explicit `connect` revives it.
    GivenUp,
}

/// Snapshot of one device's stream connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub is_connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Attempts since the stream was last open. Reset on every connect.
    pub reconnect_attempts: u32,
    /// Every reconnect attempt made for this device, never reset.
    pub total_reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Last pong or heartbeat frame seen on the open stream.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Disconnected,
            is_connected: false,
            last_connected_at: None,
            reconnect_attempts: 0,
            total_reconnect_attempts: 0,
            last_error: None,
            last_heartbeat_at: None,
        }
    }
}

/// Aggregate over every known device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatistics {
    pub total_devices: usize,
    pub active_connections: usize,
    /// Devices that are not connected and recorded an error.
    pub failed_connections: usize,
    pub total_reconnect_attempts: u32,
}
