mod cache;
mod client;
mod heuristics;
mod integration;
mod limiter;
mod normalize;
mod registry;
mod select;
mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheGeneration, METADATA_TMUX_SESSION};
pub use client::{Multiplexer, TmuxClient};
pub use heuristics::Tool;
pub use integration::{TmuxIntegration, TmuxSettings};

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Status of the agent in a session or window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No tmux window could be found for the session
    #[default]
    Missing,
    /// Agent is idle at its prompt
    Ready,
    /// Agent is working (spinner, interrupt hint)
    Active,
    /// Agent is blocked on a permission dialog
    Approval,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Missing => "missing",
            Status::Ready => "ready",
            Status::Active => "active",
            Status::Approval => "approval",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a tmux window: (session name, window index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    pub session: String,
    pub index: u32,
}

impl WindowKey {
    pub fn new(session: impl Into<String>, index: u32) -> Self {
        Self {
            session: session.into(),
            index,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.index)
    }
}

/// A tmux window as reported by `list-windows`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Name of the owning tmux session
    pub session_name: String,
    /// Window index within the session
    pub index: u32,
    /// Window name (usually the running command)
    pub name: String,
    /// Working directory of the active pane
    pub work_dir: String,
    /// `window_activity` timestamp; only ever compared, never interpreted
    pub activity: u64,
}

impl WindowInfo {
    pub fn key(&self) -> WindowKey {
        WindowKey::new(self.session_name.clone(), self.index)
    }

    /// Capture target for the agent pane. The agent is assumed to live in
    /// pane 0; layouts with `pane-base-index` set elsewhere are not supported.
    pub fn pane_target(&self) -> String {
        format!("{}:{}.0", self.session_name, self.index)
    }
}

/// Outcome of one status poll for a session or a single window
#[derive(Debug, Clone, Default)]
pub struct StatusResult {
    pub status: Status,
    /// Agent tool detected in the window, if any
    pub tool: Option<Tool>,
    pub window: Option<WindowKey>,
    pub window_name: String,
    /// Raw pane text from the most recent capture
    pub content: String,
    /// When the window last entered `Active`
    pub active_since: Option<Instant>,
    pub error: Option<MonitorError>,
}

impl StatusResult {
    /// No window was found for the session this cycle
    pub fn missing() -> Self {
        Self::default()
    }

    /// The poll failed; the session is reported as missing
    pub fn failed(error: MonitorError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}
