use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::event::SubscriptionEvent;
use super::filter::SubscriptionFilter;
use super::history::MessageHistory;
use super::sink::ContextSink;
use crate::config::SubscriptionConfig;
use crate::model::{ConnectionStatus, LinkState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the manager tracks for one device.
pub(crate) struct DeviceState {
    /// Distinguishes this connection from an earlier one at the same
    /// address, so a stale task never writes into a newer state.
    pub id: u64,
    pub status: ConnectionStatus,
    pub filter: SubscriptionFilter,
    pub history: MessageHistory,
    /// Outbound queue of the open socket. Replaced on every reconnect.
    pub outbound: Option<mpsc::UnboundedSender<Message>>,
    pub cancel: CancellationToken,
}

impl DeviceState {
    pub fn new(
        id: u64,
        filter: SubscriptionFilter,
        history_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            status: ConnectionStatus {
                state: LinkState::Connecting,
                ..ConnectionStatus::default()
            },
            filter,
            history: MessageHistory::new(history_capacity),
            outbound: None,
            cancel,
        }
    }

    pub fn mark_connected(&mut self, outbound: mpsc::UnboundedSender<Message>) {
        let now = Utc::now();
        self.status.state = LinkState::Connected;
        self.status.is_connected = true;
        self.status.last_connected_at = Some(now);
        self.status.last_heartbeat_at = Some(now);
        self.status.reconnect_attempts = 0;
        self.status.last_error = None;
        self.outbound = Some(outbound);
    }

    pub fn mark_disconnected(&mut self, state: LinkState, error: String) {
        self.status.state = state;
        self.status.is_connected = false;
        self.status.last_error = Some(error);
        self.outbound = None;
    }
}

/// State shared between the manager handle and its device tasks.
pub(crate) struct Shared {
    pub config: SubscriptionConfig,
    pub devices: DashMap<String, DeviceState>,
    /// Filters requested per address, kept across reconnects and
    /// disconnects.
    pub filters: DashMap<String, SubscriptionFilter>,
    pub sink: Option<Arc<dyn ContextSink>>,
    events: Mutex<Option<broadcast::Sender<Arc<SubscriptionEvent>>>>,
    next_id: AtomicU64,
}

impl Shared {
    pub fn new(config: SubscriptionConfig, sink: Option<Arc<dyn ContextSink>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            devices: DashMap::new(),
            filters: DashMap::new(),
            sink,
            events: Mutex::new(Some(events)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run `f` on the state of `address`, but only if it still belongs to
    /// connection `id`. The map entry is released before returning.
    pub fn update<R>(&self, address: &str, id: u64, f: impl FnOnce(&mut DeviceState) -> R) -> Option<R> {
        let mut entry = self.devices.get_mut(address)?;
        if entry.id != id {
            return None;
        }
        Some(f(entry.value_mut()))
    }

    pub fn emit(&self, event: SubscriptionEvent) {
        let events = self.events.lock().expect("event channel lock poisoned");
        if let Some(tx) = events.as_ref() {
            // No receivers is fine.
            let _ = tx.send(Arc::new(event));
        }
    }

    /// A receiver for future events. After `close_events` the receiver is
    /// already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SubscriptionEvent>> {
        let events = self.events.lock().expect("event channel lock poisoned");
        match events.as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn close_events(&self) {
        self.events
            .lock()
            .expect("event channel lock poisoned")
            .take();
    }
}
