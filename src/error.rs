use std::time::Duration;

use thiserror::Error;

/// Failures the monitoring engine reports against a single session or window.
///
/// None of these are fatal: they end up in `StatusResult::error` and the next
/// poll cycle is the retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The multiplexer could not be queried at all
    #[error("tmux unavailable: {0}")]
    MultiplexerUnavailable(String),

    /// Reading pane text failed for one window
    #[error("capture of {target} failed: {message}")]
    Capture { target: String, message: String },

    /// A session's poll task exceeded its deadline
    #[error("status poll for {session} timed out after {after:?}")]
    Timeout { session: String, after: Duration },

    /// A session's poll task panicked or was cancelled
    #[error("status poll for {0} aborted")]
    Aborted(String),
}
