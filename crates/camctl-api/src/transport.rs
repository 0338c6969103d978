// Device reachability parameters and HTTP client construction.
//
// Both the session client and the stream's liveness probe build their
// `reqwest::Client` through this module, so timeout, user-agent, and
// cookie handling live in one place.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

use crate::error::Error;

/// User agent sent on every control-plane request and stream handshake.
pub const USER_AGENT: &str = concat!("camctl/", env!("CARGO_PKG_VERSION"));

/// Default HTTP port of the control plane.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum spacing between two requests to the same device.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(50);

/// One physical device and how to reach its control plane.
///
/// Immutable once built; the session client keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    host: String,
    port: u16,
    timeout: Duration,
    min_request_interval: Duration,
}

impl DeviceEndpoint {
    /// Endpoint on the default port with default timing.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_HTTP_PORT,
            timeout: DEFAULT_TIMEOUT,
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn min_request_interval(&self) -> Duration {
        self.min_request_interval
    }

    /// `http://{host}:{port}` as a parsed URL.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = format!("http://{}:{}", self.host, self.port);
        Ok(Url::parse(&raw)?)
    }

    /// Build a `reqwest::Client` bound to this endpoint's timeout, storing
    /// and replaying cookies through `cookies`.
    pub fn build_client(&self, cookies: &Arc<SessionCookies>) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(cookies))
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

// ── Cookie store ─────────────────────────────────────────────────────

/// Cookie jar of one device session that can be emptied on logout.
///
/// Delegates to `reqwest`'s [`Jar`], which honors `Path`, `Max-Age`, and
/// `Expires`. `clear` swaps in a fresh jar.
#[derive(Debug, Default)]
pub struct SessionCookies {
    jar: RwLock<Jar>,
}

impl SessionCookies {
    /// Drop every stored cookie.
    pub fn clear(&self) {
        *self.jar.write().expect("cookie jar lock poisoned") = Jar::default();
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.jar
            .read()
            .expect("cookie jar lock poisoned")
            .set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar
            .read()
            .expect("cookie jar lock poisoned")
            .cookies(url)
    }
}
