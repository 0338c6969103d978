// ── Core error types ──
//
// Errors surfaced by the control and subscription managers. Transport
// failures from `camctl-api` are carried over field-for-field so callers
// still see the true cause (status code, URL, message).

use thiserror::Error;

use crate::model::ControlMode;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lease errors ─────────────────────────────────────────────────
    /// A guarded operation ran without a valid control lease.
    #[error("Invalid control context: exclusive control is not held or has expired")]
    InvalidControlContext,

    /// A control mode string did not name a known mode.
    #[error("Unsupported control mode: {mode}")]
    UnsupportedControlMode { mode: String },

    /// The device did not grant control in the requested mode.
    #[error("Could not acquire control in {mode} mode")]
    ControlUnavailable { mode: ControlMode },

    // ── Transport errors (carried from camctl-api) ───────────────────
    #[error("Device API error (HTTP {status}) at {url}: {message}")]
    Api {
        status: u16,
        message: String,
        url: String,
    },

    #[error("Cannot reach device at {url}: {message}")]
    Connection { message: String, url: String },

    #[error("Event stream failed at {url}: {message}")]
    Stream { message: String, url: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// `true` for transport-level failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Stream { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<camctl_api::Error> for CoreError {
    fn from(err: camctl_api::Error) -> Self {
        match err {
            camctl_api::Error::Api {
                status,
                message,
                url,
            } => CoreError::Api {
                status,
                message,
                url,
            },
            camctl_api::Error::Connection { message, url } => {
                CoreError::Connection { message, url }
            }
            camctl_api::Error::Stream { message, url } => CoreError::Stream { message, url },
            camctl_api::Error::StreamTimeout { url, timeout_ms } => CoreError::Stream {
                message: format!("handshake timed out after {timeout_ms}ms"),
                url,
            },
            camctl_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            camctl_api::Error::Client(message) => CoreError::Config { message },
        }
    }
}
