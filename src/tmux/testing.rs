//! Scripted in-memory multiplexer for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use super::{Multiplexer, WindowInfo};

#[derive(Default)]
pub(crate) struct FakeMux {
    windows: Mutex<Option<Vec<WindowInfo>>>,
    panes: Mutex<HashMap<String, Result<String, String>>>,
    delays: Mutex<HashMap<String, Duration>>,
    listing_delay: Mutex<Duration>,
    capture_counts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMux {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(Some(Vec::new())),
            ..Self::default()
        }
    }

    pub fn set_windows(&self, windows: Vec<WindowInfo>) {
        *self.windows.lock() = Some(windows);
    }

    /// Make `list_windows` fail until windows are set again
    pub fn fail_listing(&self) {
        *self.windows.lock() = None;
    }

    pub fn set_pane(&self, target: &str, text: &str) {
        self.panes
            .lock()
            .insert(target.to_string(), Ok(text.to_string()));
    }

    pub fn fail_pane(&self, target: &str, message: &str) {
        self.panes
            .lock()
            .insert(target.to_string(), Err(message.to_string()));
    }

    /// Delay `list_windows` after it has read the window list
    pub fn delay_listing(&self, delay: Duration) {
        *self.listing_delay.lock() = delay;
    }

    pub fn delay_pane(&self, target: &str, delay: Duration) {
        self.delays.lock().insert(target.to_string(), delay);
    }

    pub fn captures(&self, target: &str) -> usize {
        self.capture_counts.lock().get(target).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub(crate) fn window(session: &str, index: u32, name: &str, work_dir: &str, activity: u64) -> WindowInfo {
    WindowInfo {
        session_name: session.to_string(),
        index,
        name: name.to_string(),
        work_dir: work_dir.to_string(),
        activity,
    }
}

impl Multiplexer for FakeMux {
    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let windows = self.windows.lock().clone();
        let delay = *self.listing_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match windows {
            Some(windows) => Ok(windows),
            None => anyhow::bail!("no server running on /tmp/tmux-1000/default"),
        }
    }

    async fn capture_pane(&self, target: &str) -> Result<String> {
        *self
            .capture_counts
            .lock()
            .entry(target.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().get(target).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let pane = self.panes.lock().get(target).cloned();
        match pane {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => anyhow::bail!("{}", message),
            None => anyhow::bail!("can't find pane: {}", target),
        }
    }
}
