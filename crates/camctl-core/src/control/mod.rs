// ── Control arbitration ──
//
// Owns the exclusive-control lease for one device: acquisition through a
// mode transition, upkeep through a heartbeat task, and the guarded
// execution primitives feature code runs behind.

mod heartbeat;
mod lease;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use camctl_api::{ModeAction, SessionClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControlConfig;
use crate::error::CoreError;
use crate::model::{ControlMode, ControlState};

use self::heartbeat::HeartbeatTask;
use self::lease::ControlLease;

/// Clears the `acquiring` flag however an acquisition ends, including
/// when its future is dropped mid-request.
struct AcquiringGuard<'a>(&'a Mutex<ControlLease>);

impl Drop for AcquiringGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut lease) = self.0.lock() {
            lease.acquiring = false;
        }
    }
}

/// Point-in-time view of the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStatus {
    pub state: ControlState,
    /// Same as [`ControlManager::validate_control_context`].
    pub is_controlled: bool,
    pub held: bool,
    pub mode: Option<ControlMode>,
    pub heartbeat_active: bool,
    /// Time since the last successful heartbeat or grant.
    pub heartbeat_age: Option<Duration>,
}

/// Exclusive-control manager for one device.
///
/// Cheaply cloneable. Callers are expected to serialize control
/// operations per device; the manager does not queue them. Dropping the
/// last clone cancels the heartbeat task.
#[derive(Clone)]
pub struct ControlManager {
    inner: Arc<ControlInner>,
}

struct ControlInner {
    client: Arc<SessionClient>,
    config: ControlConfig,
    lease: Arc<Mutex<ControlLease>>,
    heartbeat: Mutex<Option<HeartbeatTask>>,
    cancel: CancellationToken,
}

impl Drop for ControlInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ControlManager {
    pub fn new(client: Arc<SessionClient>, config: ControlConfig) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                client,
                config,
                lease: Arc::new(Mutex::new(ControlLease::default())),
                heartbeat: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// The session client requests are delegated to.
    pub fn client(&self) -> &Arc<SessionClient> {
        &self.inner.client
    }

    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    fn lease(&self) -> MutexGuard<'_, ControlLease> {
        self.inner.lease.lock().expect("lease lock poisoned")
    }

    // ── Read-only checks ─────────────────────────────────────────────

    /// `true` iff control is held, the heartbeat loop runs, and the last
    /// heartbeat is fresher than the timeout. No side effects.
    pub fn validate_control_context(&self) -> bool {
        self.lease().is_valid(self.inner.config.heartbeat_timeout)
    }

    pub fn status(&self) -> ControlStatus {
        let timeout = self.inner.config.heartbeat_timeout;
        let lease = self.lease();
        ControlStatus {
            state: lease.state(timeout),
            is_controlled: lease.is_valid(timeout),
            held: lease.held,
            mode: lease.mode,
            heartbeat_active: lease.heartbeat_active,
            heartbeat_age: lease.last_heartbeat_at.map(|at| at.elapsed()),
        }
    }

    // ── Lease lifecycle ──────────────────────────────────────────────

    /// Acquire exclusive control in `mode`.
    ///
    /// Never fails with an error: any refusal or transport failure leaves
    /// the lease uncontrolled and returns `false`.
    pub async fn acquire_control(&self, mode: ControlMode) -> bool {
        self.lease().acquiring = true;
        let acquiring = AcquiringGuard(&self.inner.lease);
        debug!(%mode, "acquiring control");

        let granted = self.negotiate(mode).await;
        drop(acquiring);

        {
            let mut lease = self.lease();
            if granted {
                lease.grant(mode);
            } else {
                lease.clear();
            }
        }

        if granted {
            self.start_heartbeat();
            info!(%mode, "control acquired");
        } else {
            self.stop_heartbeat();
            warn!(%mode, "control not acquired");
        }
        granted
    }

    /// Query first; transition only if the device is not already there.
    async fn negotiate(&self, mode: ControlMode) -> bool {
        let client = &self.inner.client;

        match client.query_mode().await {
            Ok(reply)
                if reply.is_ok()
                    && reply
                        .msg
                        .as_deref()
                        .is_some_and(|reported| mode.matches_reported(reported)) =>
            {
                debug!(%mode, reported = ?reply.msg, "device already in requested mode");
                return true;
            }
            Ok(reply) => debug!(%mode, reported = ?reply.msg, "mode transition required"),
            Err(e) => debug!(error = %e, "mode query failed, attempting transition anyway"),
        }

        match client.set_mode(mode.action()).await {
            Ok(reply) if reply.is_ok() => true,
            Ok(reply) => {
                warn!(%mode, code = ?reply.code, desc = ?reply.desc, "device refused mode transition");
                false
            }
            Err(e) => {
                warn!(%mode, error = %e, "mode transition failed");
                false
            }
        }
    }

    /// Hold control in `mode`, acquiring or re-acquiring only when needed
    /// (not held, stale, or held in another mode).
    pub async fn ensure_control(&self, mode: ControlMode) -> bool {
        {
            let lease = self.lease();
            if lease.is_valid(self.inner.config.heartbeat_timeout) && lease.mode == Some(mode) {
                return true;
            }
        }
        self.acquire_control(mode).await
    }

    /// Re-acquire in the mode of the last grant after control was lost.
    ///
    /// Returns `false` if control was never granted (or was released).
    pub async fn restore_control(&self) -> bool {
        let last_mode = self.lease().mode;
        match last_mode {
            Some(mode) => self.ensure_control(mode).await,
            None => false,
        }
    }

    /// Give control back to the device.
    ///
    /// The heartbeat stops first so it cannot race the release. Releasing
    /// a lease that is not held succeeds without touching the device.
    pub async fn release_control(&self) -> bool {
        self.stop_heartbeat();

        let held = self.lease().held;
        if !held {
            self.lease().clear();
            debug!("release requested without held control, nothing to do");
            return true;
        }

        match self.inner.client.set_mode(ModeAction::ExitStandby).await {
            Ok(reply) if reply.is_ok() => {
                self.lease().clear();
                info!("control released");
                true
            }
            Ok(reply) => {
                warn!(code = ?reply.code, desc = ?reply.desc, "device refused release");
                false
            }
            Err(e) => {
                warn!(error = %e, "release failed");
                false
            }
        }
    }

    /// Release control and tear down the heartbeat. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        if !self.release_control().await {
            warn!("cleanup: release was not acknowledged");
        }
        self.stop_heartbeat();
    }

    // ── Guarded execution ────────────────────────────────────────────

    /// Run `operation` only under a currently valid lease.
    ///
    /// Fails with [`CoreError::InvalidControlContext`] without running it
    /// otherwise; the operation's own result is returned unchanged.
    pub async fn ensure_control_context<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        if !self.validate_control_context() {
            return Err(CoreError::InvalidControlContext.into());
        }
        operation().await
    }

    /// Hold control in `mode`, then run `operation`.
    ///
    /// An operation failure is returned as-is and does not touch the lease.
    pub async fn with_control<F, Fut, T, E>(&self, mode: ControlMode, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        if !self.ensure_control(mode).await {
            return Err(CoreError::ControlUnavailable { mode }.into());
        }
        self.ensure_control_context(operation).await
    }

    // ── Heartbeat task ───────────────────────────────────────────────

    fn start_heartbeat(&self) {
        self.stop_heartbeat();

        let task = HeartbeatTask::spawn(
            Arc::clone(&self.inner.client),
            Arc::clone(&self.inner.lease),
            self.inner.config.heartbeat_period(),
            self.inner.cancel.child_token(),
        );
        self.lease().heartbeat_active = true;
        *self.inner.heartbeat.lock().expect("heartbeat lock poisoned") = Some(task);
    }

    fn stop_heartbeat(&self) {
        let task = self
            .inner
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .take();
        if let Some(task) = task {
            task.stop();
            debug!("heartbeat stopped");
        }
        self.lease().heartbeat_active = false;
    }
}
