use std::time::{Duration, Instant};

use tracing::trace;

use super::heuristics::Tool;
use super::normalize::NormalizedContent;
use super::Status;

/// Default dwell time before a non-approval transition is accepted
pub const DEFAULT_HYSTERESIS: Duration = Duration::from_millis(500);

/// Per-window status state machine.
///
/// Raw marker matches flicker from frame to frame. The tracker only reports a
/// stable status: approval dialogs are surfaced immediately, every other change
/// has to wait out the hysteresis window since the previous accepted transition.
#[derive(Debug, Clone)]
pub struct StateTracker {
    hysteresis: Duration,
    stable: Option<Status>,
    last_transition: Option<Instant>,
    /// When the window last entered `Active`
    active_since: Option<Instant>,
    last_hash: Option<String>,
    /// Marker result for `last_hash`
    last_desired: Option<Status>,
    last_activity: Option<u64>,
    /// Rejected-candidate bookkeeping: start of the current burst and how many
    /// candidates hysteresis has discarded in it. Informational only.
    spike_start: Option<Instant>,
    spike_changes: u32,
}

impl StateTracker {
    pub fn new(hysteresis: Duration) -> Self {
        Self {
            hysteresis,
            stable: None,
            last_transition: None,
            active_since: None,
            last_hash: None,
            last_desired: None,
            last_activity: None,
            spike_start: None,
            spike_changes: 0,
        }
    }

    /// Current stable status, `Ready` until something has been observed
    pub fn status(&self) -> Status {
        self.stable.unwrap_or(Status::Ready)
    }

    pub fn active_since(&self) -> Option<Instant> {
        self.active_since
    }

    #[cfg(test)]
    pub fn spike_changes(&self) -> u32 {
        self.spike_changes
    }

    pub fn update(&mut self, content: &NormalizedContent, activity: u64, tool: Tool) -> Status {
        self.update_at(content, activity, tool, Instant::now())
    }

    /// Feed one observation taken at `now` and return the stable status
    pub fn update_at(
        &mut self,
        content: &NormalizedContent,
        activity: u64,
        tool: Tool,
        now: Instant,
    ) -> Status {
        // Identical normalized text gives identical marker results
        let desired = if self.last_hash.as_deref() == Some(content.hash()) {
            self.last_desired
        } else {
            let desired = tool.classify(content.text());
            self.last_hash = Some(content.hash().to_string());
            self.last_desired = desired;
            desired
        };

        self.apply_at(desired, activity, now)
    }

    /// Run the transition rules for a desired status (or none) at `now`
    pub fn apply_at(&mut self, desired: Option<Status>, activity: u64, now: Instant) -> Status {
        let current = self.status();
        let desired = desired.unwrap_or(current);
        let activity_changed = self.last_activity.is_some_and(|last| last != activity);
        self.last_activity = Some(activity);

        if desired == current {
            if activity_changed {
                self.reset_spike();
            }
            // First observation pins the default
            if self.stable.is_none() {
                self.accept(desired, now);
            }
            return current;
        }

        let within_hysteresis = self
            .last_transition
            .is_some_and(|at| now.saturating_duration_since(at) < self.hysteresis);

        if desired != Status::Approval && within_hysteresis {
            self.spike_start.get_or_insert(now);
            self.spike_changes += 1;
            trace!(
                from = %current,
                to = %desired,
                changes = self.spike_changes,
                "transition held back by hysteresis"
            );
            return current;
        }

        self.accept(desired, now);
        desired
    }

    fn accept(&mut self, status: Status, now: Instant) {
        self.reset_spike();
        if status == Status::Active {
            self.active_since = Some(now);
        }
        self.stable = Some(status);
        self.last_transition = Some(now);
    }

    fn reset_spike(&mut self) {
        self.spike_start = None;
        self.spike_changes = 0;
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HYSTERESIS)
    }
}
