use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::heuristics::Tool;
use super::limiter::CaptureLimiter;
use super::normalize::NormalizedContent;
use super::tracker::StateTracker;
use super::{Status, WindowKey};

/// Result of running the detector and tracker for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: Status,
    pub tool: Tool,
    pub active_since: Option<Instant>,
}

#[derive(Debug)]
struct WindowState {
    tracker: StateTracker,
    limiter: CaptureLimiter,
    /// Sticky once a real agent is recognised; a shell keeps being re-detected
    tool: Option<Tool>,
    /// Refresh serial at which the window was last listed by tmux
    last_seen: u64,
}

#[derive(Debug, Default)]
struct RegistryInner {
    serial: u64,
    windows: HashMap<WindowKey, WindowState>,
}

/// Per-window tracker and limiter state, kept apart from the window cache so
/// it survives cache rebuilds. Entries for windows that stop showing up in
/// refreshes are swept.
#[derive(Debug)]
pub struct WindowRegistry {
    inner: Mutex<RegistryInner>,
    hysteresis: Duration,
    captures_per_second: u32,
}

impl WindowRegistry {
    pub fn new(hysteresis: Duration, captures_per_second: u32) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            hysteresis,
            captures_per_second,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }

    /// Ask the window's limiter for a capture slot
    pub fn allow_capture(&self, key: &WindowKey) -> bool {
        let mut inner = self.inner.lock();
        let serial = inner.serial;
        self.entry(&mut inner.windows, key, serial).limiter.allow()
    }

    /// Detect the tool (if not yet known) and advance the window's tracker
    pub fn classify(
        &self,
        key: &WindowKey,
        content: &NormalizedContent,
        activity: u64,
    ) -> Classification {
        let mut inner = self.inner.lock();
        let serial = inner.serial;
        let state = self.entry(&mut inner.windows, key, serial);

        let tool = match state.tool {
            Some(tool) if tool != Tool::Shell => tool,
            _ => {
                let detected = Tool::detect(content.text());
                if state.tool != Some(detected) {
                    debug!(window = %key, tool = detected.name(), "detected tool");
                }
                state.tool = Some(detected);
                detected
            }
        };

        let status = state.tracker.update(content, activity, tool);
        Classification {
            status,
            tool,
            active_since: state.tracker.active_since().filter(|_| status == Status::Active),
        }
    }

    /// Start a new refresh serial and stamp every listed window with it
    pub fn mark_seen<'a>(&self, keys: impl IntoIterator<Item = &'a WindowKey>) -> u64 {
        let mut inner = self.inner.lock();
        inner.serial += 1;
        let serial = inner.serial;
        for key in keys {
            if let Some(state) = inner.windows.get_mut(key) {
                state.last_seen = serial;
            }
        }
        serial
    }

    /// Drop windows not listed in the last `max_missed` refreshes
    pub fn sweep(&self, max_missed: u64) -> usize {
        let mut inner = self.inner.lock();
        let serial = inner.serial;
        let before = inner.windows.len();
        inner
            .windows
            .retain(|_, state| serial.saturating_sub(state.last_seen) <= max_missed);
        let removed = before - inner.windows.len();
        if removed > 0 {
            debug!(removed, remaining = inner.windows.len(), "swept stale window state");
        }
        removed
    }

    fn entry<'a>(
        &self,
        windows: &'a mut HashMap<WindowKey, WindowState>,
        key: &WindowKey,
        serial: u64,
    ) -> &'a mut WindowState {
        windows.entry(key.clone()).or_insert_with(|| WindowState {
            tracker: StateTracker::new(self.hysteresis),
            limiter: CaptureLimiter::new(self.captures_per_second),
            tool: None,
            last_seen: serial,
        })
    }
}
