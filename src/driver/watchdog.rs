//! Cycle gating, failure budget and the recurring poll timer

use super::types::PollState;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Activity within this window keeps live polling on
pub const RECENT_ACTIVITY_WINDOW_MINUTES: i64 = 5;

/// What a scheduler tick or force request may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleGate {
    /// Watchdog exhausted: rebuild the session, no fetch
    Restart,
    /// A cycle is still in flight
    Skip,
    /// Busy was set; run the cycle
    Proceed,
}

impl PollState {
    pub fn new(watchdog_budget: u32) -> Self {
        let budget = watchdog_budget.max(1);
        Self {
            busy: false,
            watchdog_counter: budget,
            watchdog_budget: budget,
            last_refresh: None,
            last_active: None,
            live_data_mode: false,
            snapshot: None,
            cached_status: None,
        }
    }

    pub fn watchdog_budget(&self) -> u32 {
        self.watchdog_budget
    }

    /// Gate for a scheduled tick. Evaluated before any network call.
    pub fn gate(&mut self) -> CycleGate {
        if self.watchdog_counter == 0 {
            return CycleGate::Restart;
        }
        if self.busy {
            self.watchdog_counter = self.watchdog_counter.saturating_sub(1);
            return CycleGate::Skip;
        }
        self.busy = true;
        CycleGate::Proceed
    }

    /// Gate for a manual force poll; dropping it while busy costs no budget
    pub fn gate_forced(&mut self) -> CycleGate {
        if self.watchdog_counter == 0 {
            return CycleGate::Restart;
        }
        if self.busy {
            return CycleGate::Skip;
        }
        self.busy = true;
        CycleGate::Proceed
    }

    pub fn record_success(&mut self) {
        self.watchdog_counter = self.watchdog_budget;
        self.busy = false;
    }

    pub fn record_failure(&mut self) {
        self.watchdog_counter = self.watchdog_counter.saturating_sub(1);
        self.busy = false;
    }

    /// Restore the watchdog and clear busy after a session restart
    pub fn reset(&mut self) {
        self.watchdog_counter = self.watchdog_budget;
        self.busy = false;
    }

    /// Take over what a finished cycle learned, leaving gating fields alone
    pub fn absorb(&mut self, finished: PollState) {
        self.last_refresh = finished.last_refresh;
        self.last_active = finished.last_active;
        self.live_data_mode = finished.live_data_mode;
        self.snapshot = finished.snapshot;
        self.cached_status = finished.cached_status;
    }

    pub fn forced_interval_elapsed(
        &self,
        interval: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) -> bool {
        match (interval, self.last_refresh) {
            (Some(interval), Some(last)) => now - last > interval,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn recently_active(&self, now: DateTime<Utc>) -> bool {
        self.last_active
            .map(|t| now - t <= chrono::Duration::minutes(RECENT_ACTIVITY_WINDOW_MINUTES))
            .unwrap_or(false)
    }
}

/// Recurring poll timer; never fires while disarmed
#[derive(Debug, Default)]
pub struct PollScheduler {
    interval: Option<Interval>,
    minutes: Option<u64>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the given period. The first tick fires immediately.
    pub fn schedule(&mut self, minutes: u64) {
        let minutes = minutes.max(1);
        let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.minutes = Some(minutes);
    }

    /// Disarm. A cycle already running is not affected.
    pub fn stop(&mut self) {
        self.interval = None;
        self.minutes = None;
    }

    /// Restart the period from now, keeping the interval
    pub fn rearm(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.reset();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    pub fn minutes(&self) -> Option<u64> {
        self.minutes
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
