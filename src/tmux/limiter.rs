use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Default number of pane captures allowed per window per second
pub const DEFAULT_CAPTURES_PER_SECOND: u32 = 2;

/// Sliding-window limiter for pane captures of one window.
///
/// Never waits: a denied capture just means the caller reuses what it has.
#[derive(Debug, Clone)]
pub struct CaptureLimiter {
    max_per_second: u32,
    recent: VecDeque<Instant>,
}

impl CaptureLimiter {
    pub fn new(max_per_second: u32) -> Self {
        let max_per_second = max_per_second.max(1);
        Self {
            max_per_second,
            recent: VecDeque::with_capacity(max_per_second as usize),
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Record and permit a capture at `now` unless the last second is full
    pub fn allow_at(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        if self.recent.len() >= self.max_per_second as usize {
            return false;
        }
        self.recent.push_back(now);
        true
    }
}

impl Default for CaptureLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURES_PER_SECOND)
    }
}
