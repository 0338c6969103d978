use thiserror::Error;

/// Top-level error type for the `camctl-api` crate.
///
/// Covers every failure mode of the device surfaces: the HTTP control
/// plane and the event stream. `camctl-core` maps these into its own
/// error type without dropping any field.
#[derive(Debug, Error)]
pub enum Error {
    // ── Control plane ───────────────────────────────────────────────
    /// The device answered with a non-success HTTP status.
    #[error("Device API error (HTTP {status}) at {url}: {message}")]
    Api {
        status: u16,
        message: String,
        url: String,
    },

    /// The request never got an answer: refused, unresolvable host,
    /// connection reset, or timeout.
    #[error("Cannot reach device at {url}: {message}")]
    Connection { message: String, url: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    // ── Event stream ────────────────────────────────────────────────
    /// The streaming connection failed to open or broke mid-read.
    #[error("Event stream failed at {url}: {message}")]
    Stream { message: String, url: String },

    /// The streaming handshake did not complete in time.
    #[error("Event stream at {url} did not open within {timeout_ms}ms")]
    StreamTimeout { url: String, timeout_ms: u64 },
}

impl Error {
    /// Returns `true` if the failure happened below the protocol level
    /// and a later retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Stream { .. } | Self::StreamTimeout { .. }
        )
    }

    /// The HTTP status carried by an [`Api`](Self::Api) error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build a connection error from a `reqwest` failure.
    pub(crate) fn connection(err: &reqwest::Error, url: &str) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_owned()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Connection {
            message,
            url: url.to_owned(),
        }
    }
}
