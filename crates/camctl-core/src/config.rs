// ── Runtime tuning ──
//
// These types describe how the managers pace themselves. They never touch
// disk; `camctl-config` (or a test) builds them and hands them in.

use std::time::Duration;

use camctl_api::stream::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_STREAM_PORT};
use camctl_api::transport::{DEFAULT_HTTP_PORT, DEFAULT_MIN_REQUEST_INTERVAL, DEFAULT_TIMEOUT};
use camctl_api::DeviceEndpoint;

/// Capacity of each device's message history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Shortest period a heartbeat or ping timer runs at.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(10);

/// Lease timing for the control arbitration manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    /// Period of the session heartbeat.
    pub heartbeat_interval: Duration,
    /// A lease whose last heartbeat is older than this is invalid.
    pub heartbeat_timeout: Duration,
}

impl ControlConfig {
    /// `heartbeat_interval`, raised to [`MIN_TICK_PERIOD`].
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_interval.max(MIN_TICK_PERIOD)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
        }
    }
}

/// Connection policy for the live event subscription manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Control-plane port used for the pre-connect liveness probe.
    pub http_port: u16,
    /// Port of the event stream.
    pub stream_port: u16,
    /// Timeout of the liveness probe request.
    pub probe_timeout: Duration,
    /// Handshake timeout of the event stream.
    pub connect_timeout: Duration,
    /// Base reconnect delay; attempt `n` waits `n * reconnect_delay`.
    pub reconnect_delay: Duration,
    /// Automatic reconnects stop after this many attempts.
    pub max_reconnect_attempts: u32,
    /// How often to ping an open stream.
    pub heartbeat_interval: Duration,
    /// An open stream silent for this long is treated as closed.
    pub heartbeat_timeout: Duration,
    /// Messages kept per device.
    pub history_capacity: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            probe_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SubscriptionConfig {
    /// Control-plane endpoint used to probe `address` before streaming.
    pub(crate) fn probe_endpoint(&self, address: &str) -> DeviceEndpoint {
        DeviceEndpoint::new(address)
            .with_port(self.http_port)
            .with_timeout(self.probe_timeout)
            .with_min_request_interval(DEFAULT_MIN_REQUEST_INTERVAL)
    }

    /// `heartbeat_interval`, raised to [`MIN_TICK_PERIOD`].
    pub fn ping_period(&self) -> Duration {
        self.heartbeat_interval.max(MIN_TICK_PERIOD)
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        self.reconnect_delay.saturating_mul(attempt)
    }
}
