// ── Per-device stream task ──
//
// One task per connected device: reads frames, pings, forwards outbound
// messages, and runs the bounded reconnect loop after an unexpected close.

use std::sync::Arc;

use camctl_api::DeviceFrame;
use camctl_api::stream::{DeviceSocket, decode_frames, open_stream, stream_url};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::event::SubscriptionEvent;
use super::state::Shared;
use crate::model::{ContextUpdate, InboundMessage, LinkState};

type Outbound = mpsc::UnboundedReceiver<Message>;

/// Open the event stream of `address` with the configured port and timeout.
pub(crate) async fn open(shared: &Shared, address: &str) -> Result<DeviceSocket, camctl_api::Error> {
    let url = stream_url(address, shared.config.stream_port)?;
    open_stream(&url, shared.config.connect_timeout).await
}

/// Take over an open socket for connection `id`.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    address: String,
    id: u64,
    socket: DeviceSocket,
    outbound: Outbound,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        device_loop(&shared, &address, id, socket, outbound, &cancel).await;
    });
}

/// Main loop: read until the stream drops, then reconnect or give up.
async fn device_loop(
    shared: &Shared,
    address: &str,
    id: u64,
    mut socket: DeviceSocket,
    mut outbound: Outbound,
    cancel: &CancellationToken,
) {
    loop {
        let Err(reason) = read_loop(shared, address, id, socket, &mut outbound, cancel).await else {
            break;
        };

        warn!(address, reason = %reason, "event stream closed unexpectedly");
        let ours = shared
            .update(address, id, |state| {
                state.mark_disconnected(LinkState::Disconnected, reason.clone());
            })
            .is_some();
        if !ours {
            break;
        }
        shared.emit(SubscriptionEvent::Disconnected {
            address: address.to_owned(),
            reason,
        });

        match reconnect(shared, address, id, cancel).await {
            Some((next_socket, next_outbound)) => {
                socket = next_socket;
                outbound = next_outbound;
            }
            None => break,
        }
    }

    debug!(address, "event stream task exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Drive one open socket. `Ok` means cancelled; `Err` carries the reason
/// for an unexpected close.
async fn read_loop(
    shared: &Shared,
    address: &str,
    id: u64,
    socket: DeviceSocket,
    outbound: &mut Outbound,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let config = &shared.config;
    let (mut write, mut read) = socket.split();

    let mut ping = tokio::time::interval(config.ping_period());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.tick().await;

    let mut alive_at = Instant::now();

    loop {
        let deadline = alive_at + config.heartbeat_timeout;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if dispatch(shared, address, id, text.as_str()) {
                        alive_at = Instant::now();
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                    trace!(address, "stream heartbeat");
                    alive_at = Instant::now();
                    shared.update(address, id, |state| {
                        state.status.last_heartbeat_at = Some(Utc::now());
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(frame.map_or_else(
                        || "closed by device".to_owned(),
                        |cf| format!("closed by device ({}): {}", cf.code, cf.reason.as_str()),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.to_string()),
                None => return Err("stream ended".to_owned()),
            },
            Some(message) = outbound.recv() => {
                write.send(message).await.map_err(|e| e.to_string())?;
            }
            _ = ping.tick() => {
                write
                    .send(Message::Ping(Default::default()))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(format!(
                    "no heartbeat within {}s",
                    config.heartbeat_timeout.as_secs()
                ));
            }
        }
    }
}

// ── Inbound dispatch ─────────────────────────────────────────────────

/// Handle one text frame. Returns `true` if it carried a heartbeat.
fn dispatch(shared: &Shared, address: &str, id: u64, text: &str) -> bool {
    let mut heartbeat = false;

    for decoded in decode_frames(text) {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                warn!(address, error = %e, "dropping undecodable stream message");
                continue;
            }
        };

        let message = InboundMessage::from_frame(&frame);
        let update = match &frame {
            DeviceFrame::Heartbeat(_) => {
                heartbeat = true;
                let seen_at = message.received_at;
                shared.update(address, id, |state| {
                    state.status.last_heartbeat_at = Some(seen_at);
                    state.history.push(message);
                });
                continue;
            }
            DeviceFrame::Status(fields) => Some(ContextUpdate::from_status(address, fields)),
            DeviceFrame::CameraInfo(fields) => {
                Some(ContextUpdate::from_camera_info(address, fields))
            }
            DeviceFrame::Unknown(_) => None,
        };

        let Some(filter) = shared.update(address, id, |state| {
            state.history.push(message.clone());
            state.filter
        }) else {
            break;
        };

        let update = update.and_then(|update| filter.apply(update));
        if let (Some(sink), Some(update)) = (&shared.sink, &update) {
            sink.update_context(update);
        }

        shared.emit(SubscriptionEvent::Message {
            address: address.to_owned(),
            message,
            update,
        });
    }

    heartbeat
}

// ── Reconnection ─────────────────────────────────────────────────────

/// Linear-backoff reconnect, bounded by `max_reconnect_attempts`.
///
/// Every attempt, failed or not, counts toward the cap. Returns the new
/// socket, or `None` when cancelled or given up.
async fn reconnect(
    shared: &Shared,
    address: &str,
    id: u64,
    cancel: &CancellationToken,
) -> Option<(DeviceSocket, Outbound)> {
    let config = &shared.config;

    loop {
        let next_attempt = shared.update(address, id, |state| {
            if state.status.reconnect_attempts >= config.max_reconnect_attempts {
                state.status.state = LinkState::GivenUp;
                None
            } else {
                state.status.reconnect_attempts += 1;
                state.status.total_reconnect_attempts += 1;
                state.status.state = LinkState::Reconnecting;
                Some(state.status.reconnect_attempts)
            }
        })?;

        let Some(attempt) = next_attempt else {
            error!(
                address,
                max_attempts = config.max_reconnect_attempts,
                "event stream reconnection limit reached, giving up"
            );
            shared.emit(SubscriptionEvent::ReconnectFailed {
                address: address.to_owned(),
                attempts: config.max_reconnect_attempts,
            });
            return None;
        };

        let delay = config.reconnect_delay_for(attempt);
        info!(
            address,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect"
        );
        shared.emit(SubscriptionEvent::Reconnecting {
            address: address.to_owned(),
            attempt,
            delay,
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            result = open(shared, address) => result,
        };

        match result {
            Ok(socket) => {
                let (tx, rx) = mpsc::unbounded_channel();
                shared.update(address, id, |state| state.mark_connected(tx))?;
                info!(address, attempt, "event stream reconnected");
                shared.emit(SubscriptionEvent::Connected {
                    address: address.to_owned(),
                });
                return Some((socket, rx));
            }
            Err(e) => {
                warn!(address, attempt, error = %e, "reconnect attempt failed");
                let message = e.to_string();
                shared.update(address, id, |state| {
                    state.status.last_error = Some(message.clone());
                });
                shared.emit(SubscriptionEvent::Error {
                    address: address.to_owned(),
                    message,
                });
            }
        }
    }
}
