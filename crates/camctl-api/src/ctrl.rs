// Control-plane endpoints
//
// Mode query/transition, session heartbeat/quit, named settings, and the
// device info probe. Each helper is exactly one `request` call.

use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::models::{ModeAction, StatusReply};
use crate::session::{RequestOptions, SessionClient};

const MODE_PATH: &str = "/ctrl/mode";
const SESSION_PATH: &str = "/ctrl/session";
const GET_PATH: &str = "/ctrl/get";
const SET_PATH: &str = "/ctrl/set";
const INFO_PATH: &str = "/info";

impl SessionClient {
    /// Ask the device which mode it is in.
    ///
    /// `GET /ctrl/mode?action=query`
    pub async fn query_mode(&self) -> Result<StatusReply, Error> {
        let value = self
            .request(MODE_PATH, RequestOptions::default().query("action", "query"))
            .await?;
        Ok(StatusReply::from_value(&value))
    }

    /// Request a mode transition.
    ///
    /// `GET /ctrl/mode?action={to_rec|to_standby|exit_standby}`
    pub async fn set_mode(&self, action: ModeAction) -> Result<StatusReply, Error> {
        debug!(action = action.as_query(), "requesting mode transition");
        let value = self
            .request(
                MODE_PATH,
                RequestOptions::default().query("action", action.as_query()),
            )
            .await?;
        Ok(StatusReply::from_value(&value))
    }

    /// Lightweight liveness call that keeps the control session alive.
    ///
    /// `GET /ctrl/session`
    pub async fn heartbeat(&self) -> Result<StatusReply, Error> {
        let value = self.get(SESSION_PATH).await?;
        Ok(StatusReply::from_value(&value))
    }

    /// End the device session and forget the continuity token.
    ///
    /// `GET /ctrl/session?action=quit`. The token is cleared even when the
    /// request fails, so a dead device cannot pin a stale session.
    pub async fn logout(&self) -> Result<StatusReply, Error> {
        debug!(host = self.endpoint().host(), "quitting device session");
        let result = self
            .request(SESSION_PATH, RequestOptions::default().query("action", "quit"))
            .await;
        self.clear_session();
        result.map(|value| StatusReply::from_value(&value))
    }

    /// Read a named setting.
    ///
    /// `GET /ctrl/get?k={key}`
    pub async fn get_setting(&self, key: &str) -> Result<Value, Error> {
        self.request(GET_PATH, RequestOptions::default().query("k", key))
            .await
    }

    /// Write a named setting.
    ///
    /// `GET /ctrl/set?k={key}&v={value}`
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<StatusReply, Error> {
        debug!(key, value, "writing setting");
        let reply = self
            .request(
                SET_PATH,
                RequestOptions::default().query("k", key).query("v", value),
            )
            .await?;
        Ok(StatusReply::from_value(&reply))
    }

    /// Fetch the device identity block.
    ///
    /// `GET /info`. Returns loosely-typed JSON because the field set
    /// varies by model and firmware.
    pub async fn device_info(&self) -> Result<Value, Error> {
        self.get(INFO_PATH).await
    }

    /// Liveness probe. Any failure is reported as `false`.
    pub async fn test_connection(&self) -> bool {
        match self.device_info().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, host = self.endpoint().host(), "connection test failed");
                false
            }
        }
    }
}
