use std::sync::{Arc, Mutex};
use std::time::Duration;

use camctl_api::SessionClient;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lease::ControlLease;

/// Handle to a running lease heartbeat.
pub(crate) struct HeartbeatTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    pub fn spawn(
        client: Arc<SessionClient>,
        lease: Arc<Mutex<ControlLease>>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(heartbeat_loop(client, lease, period, task_cancel));
        Self { cancel, handle }
    }

    /// Signal the loop to exit. An in-flight heartbeat finishes on its own
    /// and its result is discarded.
    pub fn stop(self) {
        self.cancel.cancel();
        drop(self.handle);
    }
}

/// Refresh the lease every `period` until cancelled.
///
/// A failed heartbeat marks the lease not-held but keeps the loop alive:
/// the next success re-validates it.
async fn heartbeat_loop(
    client: Arc<SessionClient>,
    lease: Arc<Mutex<ControlLease>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let result = client.heartbeat().await;
                if cancel.is_cancelled() {
                    debug!("heartbeat finished after teardown, ignoring result");
                    break;
                }

                let mut lease = lease.lock().expect("lease lock poisoned");
                match result {
                    // Plain-text acknowledgements carry no code and count as success.
                    Ok(reply) if reply.code.is_none_or(|code| code == 0) => {
                        if !lease.held {
                            info!("heartbeat succeeded again, control re-validated");
                        }
                        lease.held = true;
                        lease.last_heartbeat_at = Some(Instant::now());
                    }
                    Ok(reply) => {
                        warn!(code = ?reply.code, desc = ?reply.desc, "device rejected heartbeat, control lost");
                        lease.held = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "heartbeat failed, control lost");
                        lease.held = false;
                    }
                }
            }
        }
    }

    debug!("heartbeat loop exiting");
}
