//! Shared configuration for camctl tools.
//!
//! Layered loading (built-in defaults, then a TOML file, then `CAMCTL_*`
//! environment variables) and translation into the runtime types of
//! `camctl-api` and `camctl-core`.
//!
//! Environment keys use `__` between section and field, e.g.
//! `CAMCTL_DEVICE__HOST=192.168.1.50` or `CAMCTL_EVENTS__MAX_RECONNECT_ATTEMPTS=3`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use camctl_api::DeviceEndpoint;
use camctl_core::{ControlConfig, ControlMode, SubscriptionConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceSection,
    pub control: ControlSection,
    pub events: EventsSection,
    pub log: LogSection,
}

/// The camera to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Hostname or IP address. Required.
    pub host: String,
    pub http_port: u16,
    pub stream_port: u16,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Minimum spacing between control-plane requests.
    pub min_request_interval_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            http_port: 80,
            stream_port: 81,
            timeout_ms: 10_000,
            min_request_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlSection {
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// Mode to take control in at startup (`recording`, `standby`, `auto`).
    /// Unset means observe only.
    pub acquire_mode: Option<String>,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            heartbeat_timeout_secs: 30,
            acquire_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsSection {
    pub connect_timeout_secs: u64,
    /// Base of the linear reconnect backoff.
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub history_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            reconnect_delay_ms: 5_000,
            max_reconnect_attempts: 5,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            history_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "camctl", "camctl").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("camctl");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the platform config file (if present) and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (if present) and the environment, then validate.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// The provider stack: defaults < TOML file < `CAMCTL_*` environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CAMCTL_").split("__"))
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::invalid(
                "device.host",
                "no camera address configured (set it in the config file or CAMCTL_DEVICE__HOST)",
            ));
        }
        if self.device.timeout_ms == 0 {
            return Err(ConfigError::invalid("device.timeout_ms", "must be greater than zero"));
        }
        if self.control.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "control.heartbeat_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.control.heartbeat_timeout_secs <= self.control.heartbeat_interval_secs {
            return Err(ConfigError::invalid(
                "control.heartbeat_timeout_secs",
                "must exceed control.heartbeat_interval_secs",
            ));
        }
        if self.events.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "events.heartbeat_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.events.heartbeat_timeout_secs <= self.events.heartbeat_interval_secs {
            return Err(ConfigError::invalid(
                "events.heartbeat_timeout_secs",
                "must exceed events.heartbeat_interval_secs",
            ));
        }
        if self.events.history_capacity == 0 {
            return Err(ConfigError::invalid(
                "events.history_capacity",
                "must be greater than zero",
            ));
        }
        self.acquire_mode()?;
        Ok(())
    }

    /// Parsed `control.acquire_mode`.
    pub fn acquire_mode(&self) -> Result<Option<ControlMode>, ConfigError> {
        self.control
            .acquire_mode
            .as_deref()
            .map(|raw| {
                raw.parse::<ControlMode>()
                    .map_err(|e| ConfigError::invalid("control.acquire_mode", e.to_string()))
            })
            .transpose()
    }

    /// Control-plane endpoint of the configured device.
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.device.host.trim())
            .with_port(self.device.http_port)
            .with_timeout(Duration::from_millis(self.device.timeout_ms))
            .with_min_request_interval(Duration::from_millis(self.device.min_request_interval_ms))
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            heartbeat_interval: Duration::from_secs(self.control.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(self.control.heartbeat_timeout_secs),
        }
    }

    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            http_port: self.device.http_port,
            stream_port: self.device.stream_port,
            probe_timeout: Duration::from_millis(self.device.timeout_ms),
            connect_timeout: Duration::from_secs(self.events.connect_timeout_secs),
            reconnect_delay: Duration::from_millis(self.events.reconnect_delay_ms),
            max_reconnect_attempts: self.events.max_reconnect_attempts,
            heartbeat_interval: Duration::from_secs(self.events.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(self.events.heartbeat_timeout_secs),
            history_capacity: self.events.history_capacity,
        }
    }
}
