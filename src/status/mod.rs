mod fetcher;

pub use fetcher::{BatchStatusFetcher, DEFAULT_TASK_TIMEOUT};

use std::future::Future;

use serde::Serialize;

use crate::error::MonitorError;
use crate::session::Session;
use crate::tmux::{Multiplexer, Status, StatusResult, TmuxIntegration, WindowInfo};

/// A source of agent statuses the batch fetcher can poll
pub trait StatusIntegration: Send + Sync + 'static {
    /// Refresh whatever listing discovery depends on. Failures are handled
    /// (and logged) by the integration itself.
    fn refresh(&self) -> impl Future<Output = ()> + Send;

    /// Window to report for a session; `None` when it cannot be found this cycle
    fn discover(&self, session: &Session) -> Option<WindowInfo>;

    fn status(
        &self,
        window: &WindowInfo,
    ) -> impl Future<Output = Result<StatusResult, MonitorError>> + Send;

    /// Every monitored window sharing the discovered window's session, for
    /// integrations that can enumerate them
    fn windows(&self, _window: &WindowInfo) -> Option<Vec<WindowInfo>> {
        None
    }
}

impl<M: Multiplexer> StatusIntegration for TmuxIntegration<M> {
    async fn refresh(&self) {
        // Already logged; the cache is cleared and discovery misses this cycle
        let _ = self.refresh_cache().await;
    }

    fn discover(&self, session: &Session) -> Option<WindowInfo> {
        self.resolve_window(session)
    }

    async fn status(&self, window: &WindowInfo) -> Result<StatusResult, MonitorError> {
        self.get_status(window).await
    }

    fn windows(&self, window: &WindowInfo) -> Option<Vec<WindowInfo>> {
        Some(self.session_windows(&window.session_name))
    }
}

/// Poll result for one dashboard session
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    /// Status of the session's agent window
    pub result: StatusResult,
    /// Per-window results, present only when the session has several windows
    pub windows: Option<Vec<StatusResult>>,
}

impl SessionStatus {
    pub fn missing() -> Self {
        Self {
            result: StatusResult::missing(),
            windows: None,
        }
    }

    pub fn failed(error: MonitorError) -> Self {
        Self {
            result: StatusResult::failed(error),
            windows: None,
        }
    }

    pub fn status(&self) -> Status {
        self.result.status
    }
}

/// A session's status differs from the previous sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub session_id: String,
    pub old: Status,
    pub new: Status,
}
