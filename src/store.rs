use crate::types::{SystemStatus, Zone, ZoneSnapshot, ZoneStatus};
use std::time::Duration;
use tokio::time::Instant;

/// Default presence window: the link streams status continuously while the
/// amplifier is powered, so two seconds of silence means it is off.
pub const DEFAULT_WATCHDOG_WINDOW: Duration = Duration::from_secs(2);

/// Single owner of the reconciled [`SystemStatus`]
///
/// All mutation goes through [`apply`](Self::apply) and
/// [`check_presence`](Self::check_presence).
pub struct StatusStore {
    status: SystemStatus,
    window: Duration,
    deadline: Option<Instant>,
}

impl StatusStore {
    pub fn new(window: Duration) -> Self {
        Self {
            status: SystemStatus::default(),
            window,
            deadline: None,
        }
    }

    /// Current snapshot
    pub fn status(&self) -> SystemStatus {
        self.status
    }

    pub fn zone(&self, zone: Zone) -> ZoneStatus {
        self.status.zone(zone)
    }

    /// Record a decoded status frame received at `now`
    ///
    /// Returns the new snapshot and whether subscribers need to hear about it:
    /// any zone field differing, or the system coming back on.
    pub fn apply(&mut self, zones: ZoneSnapshot, now: Instant) -> (SystemStatus, bool) {
        self.deadline = Some(now + self.window);

        let turned_on = !self.status.on;
        let zones_changed = self.status.zones != zones;
        if turned_on {
            tracing::info!("Status frames arriving, system is on");
        }

        self.status = SystemStatus { zones, on: true };
        (self.status, turned_on || zones_changed)
    }

    /// Watchdog check: infer power-off when no frame arrived within the window
    ///
    /// Returns true exactly once per off transition.
    pub fn check_presence(&mut self, now: Instant) -> bool {
        if !self.status.on {
            return false;
        }
        match self.deadline {
            Some(deadline) if now > deadline => {
                tracing::info!("No status for {:?}, system is off", self.window);
                self.status = SystemStatus::default();
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHDOG_WINDOW)
    }
}
