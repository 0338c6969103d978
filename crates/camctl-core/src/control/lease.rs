use std::time::Duration;

use tokio::time::Instant;

use crate::model::{ControlMode, ControlState};

/// Exclusive-control lease for one device.
///
/// `held` alone does not make the lease valid: the heartbeat loop must be
/// running and must have succeeded within the timeout.
#[derive(Debug, Clone, Default)]
pub(crate) struct ControlLease {
    pub held: bool,
    /// Mode of the last grant. Survives heartbeat failures so control can
    /// be restored in the same mode.
    pub mode: Option<ControlMode>,
    pub last_heartbeat_at: Option<Instant>,
    pub heartbeat_active: bool,
    pub acquiring: bool,
}

impl ControlLease {
    pub fn is_valid(&self, timeout: Duration) -> bool {
        self.held
            && self.heartbeat_active
            && self
                .last_heartbeat_at
                .is_some_and(|at| at.elapsed() < timeout)
    }

    pub fn state(&self, timeout: Duration) -> ControlState {
        if self.acquiring {
            ControlState::Acquiring
        } else if self.is_valid(timeout) {
            ControlState::Controlled
        } else if self.mode.is_some() {
            ControlState::Expired
        } else {
            ControlState::Uncontrolled
        }
    }

    /// Record a device acknowledgement for `mode`.
    pub fn grant(&mut self, mode: ControlMode) {
        self.held = true;
        self.mode = Some(mode);
        self.last_heartbeat_at = Some(Instant::now());
        self.heartbeat_active = true;
    }

    pub fn clear(&mut self) {
        *self = Self {
            acquiring: self.acquiring,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn fresh_lease_is_uncontrolled() {
        let lease = ControlLease::default();
        assert!(!lease.is_valid(TIMEOUT));
        assert_eq!(lease.state(TIMEOUT), ControlState::Uncontrolled);
    }

    #[test]
    fn granted_lease_is_valid() {
        let mut lease = ControlLease::default();
        lease.grant(ControlMode::Recording);
        assert!(lease.is_valid(TIMEOUT));
        assert_eq!(lease.state(TIMEOUT), ControlState::Controlled);
    }

    #[test]
    fn held_without_heartbeat_loop_is_invalid() {
        let mut lease = ControlLease::default();
        lease.grant(ControlMode::Standby);
        lease.heartbeat_active = false;
        assert!(!lease.is_valid(TIMEOUT));
        assert_eq!(lease.state(TIMEOUT), ControlState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_heartbeat_expires_lease() {
        let mut lease = ControlLease::default();
        lease.grant(ControlMode::Recording);

        tokio::time::advance(TIMEOUT + Duration::from_millis(1)).await;

        assert!(lease.held);
        assert!(!lease.is_valid(TIMEOUT));
        assert_eq!(lease.state(TIMEOUT), ControlState::Expired);
    }

    #[test]
    fn clear_forgets_mode() {
        let mut lease = ControlLease::default();
        lease.grant(ControlMode::Auto);
        lease.clear();
        assert_eq!(lease.mode, None);
        assert_eq!(lease.state(TIMEOUT), ControlState::Uncontrolled);
    }
}
