// Session-continuous HTTP client for one device.
//
// Wraps `reqwest::Client` with request spacing, continuity-token handling,
// and body decoding. Endpoint helpers (mode, session, settings) are
// implemented as inherent methods in `ctrl.rs` to keep this module focused
// on transport mechanics.

use std::sync::{Arc, RwLock};

use reqwest::cookie::CookieStore;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{DeviceEndpoint, SessionCookies};

/// Longest slice of an error body carried into [`Error::Api`].
const ERROR_BODY_PREVIEW: usize = 200;

/// Per-request knobs for [`SessionClient::request`].
///
/// Defaults to a bare `GET` with no extra query pairs and no body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: reqwest::Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestOptions {
    /// Append a query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Switch to `POST` with a JSON body.
    pub fn post(mut self, body: Value) -> Self {
        self.method = reqwest::Method::POST;
        self.body = Some(body);
        self
    }
}

/// Continuity state of one device session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Cookie header value replayed to the device root (`name=value; ...`).
    pub token: Option<String>,
    /// When the most recent request was issued.
    pub last_request_at: Option<Instant>,
}

/// Rate-limited, session-continuous HTTP client bound to one device.
///
/// Requests are serialized in issuance order; each one starts no sooner
/// than `min_request_interval` after the previous one completed.
pub struct SessionClient {
    http: reqwest::Client,
    endpoint: DeviceEndpoint,
    base_url: Url,
    cookies: Arc<SessionCookies>,
    last_request_at: RwLock<Option<Instant>>,
    /// FIFO gate holding the completion time of the previous request.
    gate: Mutex<Option<Instant>>,
}

impl SessionClient {
    /// Create a client for `endpoint` with a fresh, empty session.
    pub fn new(endpoint: DeviceEndpoint) -> Result<Self, Error> {
        let base_url = endpoint.base_url()?;
        let cookies = Arc::new(SessionCookies::default());
        let http = endpoint.build_client(&cookies)?;
        Ok(Self {
            http,
            endpoint,
            base_url,
            cookies,
            last_request_at: RwLock::new(None),
            gate: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Session state ────────────────────────────────────────────────

    /// The `Cookie` header value the device root currently receives, if
    /// any cookie is live.
    pub fn session_token(&self) -> Option<String> {
        let cookies = self.cookies.cookies(&self.base_url)?;
        cookies.to_str().ok().map(String::from)
    }

    /// When the last request was issued.
    pub fn last_request_at(&self) -> Option<Instant> {
        *self
            .last_request_at
            .read()
            .expect("session lock poisoned")
    }

    /// Snapshot of the continuity state.
    pub fn session(&self) -> Session {
        Session {
            token: self.session_token(),
            last_request_at: self.last_request_at(),
        }
    }

    /// Forget every cookie the device issued.
    pub fn clear_session(&self) {
        debug!(host = self.endpoint.host(), "clearing session cookies");
        self.cookies.clear();
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Build the full URL for `path` (which may carry its own query).
    pub(crate) fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, Error> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Issue one request to the device and decode the reply.
    ///
    /// Waits for the rate-limit window, attaches the session token, and
    /// stores any renewed token from the response. Never retries.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, Error> {
        let url = self.url_for(path, &options.query)?;

        let mut gate = self.gate.lock().await;
        if let Some(previous) = *gate {
            let ready_at = previous + self.endpoint.min_request_interval();
            if ready_at > Instant::now() {
                trace!(url = %url, "rate limit: delaying request");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *self.last_request_at.write().expect("session lock poisoned") = Some(Instant::now());

        let result = self.send(url, options).await;
        *gate = Some(Instant::now());
        drop(gate);

        result
    }

    /// Shorthand for a plain `GET`.
    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        self.request(path, RequestOptions::default()).await
    }

    async fn send(&self, url: Url, options: RequestOptions) -> Result<Value, Error> {
        debug!("{} {}", options.method, url);

        let mut builder = self.http.request(options.method, url.clone());
        if let Some(ref body) = options.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::connection(&e, url.as_str()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.trim().chars().take(ERROR_BODY_PREVIEW).collect();
            let message = if preview.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                preview
            };
            return Err(Error::Api {
                status: status.as_u16(),
                message,
                url: url.to_string(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::connection(&e, url.as_str()))?;

        Ok(decode_body(&body))
    }
}

/// Decode a success body.
///
/// Many firmware builds answer simple acknowledgements with plain text, so
/// anything that is not a JSON object or array is wrapped instead of failing.
fn decode_body(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => json!({ "success": true, "data": body }),
    }
}
