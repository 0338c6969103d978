// ── Live event subscriptions ──
//
// One long-lived event stream per device. Inbound status is translated
// into context updates, reduced by a per-device filter, and pushed to the
// application's sink; every frame lands in a bounded history and on the
// event channel. Unexpected closes are retried with linear backoff up to
// a fixed cap.

mod connection;
mod event;
mod filter;
mod history;
mod sink;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use camctl_api::SessionClient;
use camctl_api::stream::DeviceSocket;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SubscriptionConfig;
use crate::error::CoreError;
use crate::model::{ConnectionStatistics, ConnectionStatus, InboundMessage, LinkState};

pub use event::{SubscriptionEvent, SubscriptionEventStream};
pub use filter::SubscriptionFilter;
pub use sink::ContextSink;

use self::state::{DeviceState, Shared};

/// Manager of per-device event streams.
///
/// Cheaply cloneable. Dropping the last clone stops every stream task but
/// leaves listeners open; [`destroy`](Self::destroy) tears down everything.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SubscriptionManager {
    /// A manager without a context sink. Updates are still available
    /// through [`subscribe`](Self::subscribe).
    pub fn new(config: SubscriptionConfig) -> Self {
        Self::build(config, None)
    }

    /// A manager that pushes filtered context updates to `sink`.
    pub fn with_sink(config: SubscriptionConfig, sink: impl ContextSink + 'static) -> Self {
        Self::build(config, Some(Arc::new(sink)))
    }

    fn build(config: SubscriptionConfig, sink: Option<Arc<dyn ContextSink>>) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                shared: Arc::new(Shared::new(config, sink)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.inner.shared.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the event stream of `address`, replacing any existing one.
    ///
    /// Probes the control plane first. Returns `false` on any failure,
    /// with the cause recorded in the device's status; an explicit
    /// connect is never retried automatically.
    pub async fn connect(&self, address: &str) -> bool {
        if self.inner.cancel.is_cancelled() {
            warn!(address, "connect after destroy ignored");
            return false;
        }
        self.disconnect(address);

        let shared = &self.inner.shared;
        let id = shared.next_id();
        let cancel = self.inner.cancel.child_token();
        let filter = shared
            .filters
            .get(address)
            .map_or_else(SubscriptionFilter::all, |filter| *filter);

        shared.devices.insert(
            address.to_owned(),
            DeviceState::new(id, filter, shared.config.history_capacity, cancel.clone()),
        );
        debug!(address, "connecting event stream");

        let socket = tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            result = self.establish(address) => result,
        };

        match socket {
            Ok(socket) => {
                let (tx, rx) = mpsc::unbounded_channel();
                if shared.update(address, id, |state| state.mark_connected(tx)).is_none() {
                    debug!(address, "disconnected while connecting");
                    return false;
                }
                info!(address, "event stream connected");
                shared.emit(SubscriptionEvent::Connected {
                    address: address.to_owned(),
                });

                connection::spawn(Arc::clone(shared), address.to_owned(), id, socket, rx, cancel);
                true
            }
            Err(e) => {
                warn!(address, error = %e, "event stream connect failed");
                let message = e.to_string();
                shared.update(address, id, |state| {
                    state.mark_disconnected(LinkState::Disconnected, message.clone());
                });
                shared.emit(SubscriptionEvent::Error {
                    address: address.to_owned(),
                    message,
                });
                false
            }
        }
    }

    /// Liveness probe over HTTP, then the stream handshake.
    async fn establish(&self, address: &str) -> Result<DeviceSocket, CoreError> {
        let shared = &self.inner.shared;
        let probe = SessionClient::new(shared.config.probe_endpoint(address))?;
        if !probe.test_connection().await {
            return Err(CoreError::Connection {
                message: "device did not answer the liveness probe".into(),
                url: probe.base_url().to_string(),
            });
        }
        Ok(connection::open(shared, address).await?)
    }

    /// Stop the stream of `address` and forget its state, history
    /// included. Returns `false` if nothing was tracked.
    pub fn disconnect(&self, address: &str) -> bool {
        let Some((_, state)) = self.inner.shared.devices.remove(address) else {
            return false;
        };
        state.cancel.cancel();

        info!(address, "event stream disconnected");
        self.inner.shared.emit(SubscriptionEvent::Disconnected {
            address: address.to_owned(),
            reason: "disconnected by client".into(),
        });
        true
    }

    /// Disconnect every device, stop all tasks and close the event
    /// channel. The manager accepts no new connections afterwards.
    pub fn destroy(&self) {
        let shared = &self.inner.shared;
        let addresses: Vec<String> = shared.devices.iter().map(|e| e.key().clone()).collect();
        for address in &addresses {
            self.disconnect(address);
        }
        shared.filters.clear();

        self.inner.cancel.cancel();
        shared.close_events();
        info!(devices = addresses.len(), "subscription manager destroyed");
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Queue `payload` as a text frame on the open stream of `address`.
    pub fn send_message(&self, address: &str, payload: &Value) -> bool {
        let Some(state) = self.inner.shared.devices.get(address) else {
            return false;
        };
        if !state.status.is_connected {
            return false;
        }
        state
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(Message::Text(payload.to_string().into())).is_ok())
    }

    // ── Filters ──────────────────────────────────────────────────────

    /// Store `filter` for `address`. Applies immediately to an open
    /// stream and to every later connect.
    pub fn set_subscription_options(&self, address: &str, filter: SubscriptionFilter) {
        let shared = &self.inner.shared;
        shared.filters.insert(address.to_owned(), filter);
        if let Some(mut state) = shared.devices.get_mut(address) {
            state.filter = filter;
        }
    }

    /// The filter in effect for `address`, or the one stored for its next
    /// connect.
    pub fn subscription_options(&self, address: &str) -> Option<SubscriptionFilter> {
        let shared = &self.inner.shared;
        shared
            .devices
            .get(address)
            .map(|state| state.filter)
            .or_else(|| shared.filters.get(address).map(|filter| *filter))
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn connection_status(&self, address: &str) -> Option<ConnectionStatus> {
        self.inner
            .shared
            .devices
            .get(address)
            .map(|state| state.status.clone())
    }

    pub fn all_connection_status(&self) -> HashMap<String, ConnectionStatus> {
        self.inner
            .shared
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.status.clone()))
            .collect()
    }

    pub fn active_connections_count(&self) -> usize {
        self.inner
            .shared
            .devices
            .iter()
            .filter(|entry| entry.status.is_connected)
            .count()
    }

    pub fn connection_statistics(&self) -> ConnectionStatistics {
        self.inner.shared.devices.iter().fold(
            ConnectionStatistics::default(),
            |mut stats, entry| {
                let status = &entry.status;
                stats.total_devices += 1;
                if status.is_connected {
                    stats.active_connections += 1;
                } else if status.last_error.is_some() {
                    stats.failed_connections += 1;
                }
                stats.total_reconnect_attempts += status.total_reconnect_attempts;
                stats
            },
        )
    }

    // ── History ──────────────────────────────────────────────────────

    /// Copy of the recorded messages of `address`, oldest first. Empty if
    /// the device is unknown.
    pub fn message_history(&self, address: &str) -> Vec<InboundMessage> {
        self.inner
            .shared
            .devices
            .get(address)
            .map(|state| state.history.snapshot())
            .unwrap_or_default()
    }

    pub fn clear_message_history(&self, address: &str) -> bool {
        match self.inner.shared.devices.get_mut(address) {
            Some(mut state) => {
                state.history.clear();
                true
            }
            None => false,
        }
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Receiver for events from now on. Closed once the manager is
    /// destroyed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SubscriptionEvent>> {
        self.inner.shared.subscribe()
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`.
    pub fn event_stream(&self) -> SubscriptionEventStream {
        SubscriptionEventStream::new(self.subscribe())
    }
}
