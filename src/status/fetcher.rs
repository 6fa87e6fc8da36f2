use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{SessionStatus, StatusEvent, StatusIntegration};
use crate::error::MonitorError;
use crate::session::Session;
use crate::tmux::{Status, StatusResult, WindowInfo};

/// Default per-session poll deadline
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(2);

/// Polls every session once per sweep with bounded concurrency.
///
/// One slow or failing session only affects its own entry in the result map.
pub struct BatchStatusFetcher<I> {
    integration: Arc<I>,
    max_workers: usize,
    task_timeout: Duration,
    /// Status of each session at the end of the previous sweep
    previous: Mutex<HashMap<String, Status>>,
    events: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl<I: StatusIntegration> BatchStatusFetcher<I> {
    pub fn new(integration: Arc<I>, max_workers: usize, task_timeout: Duration) -> Self {
        Self {
            integration,
            max_workers: max_workers.max(1),
            task_timeout,
            previous: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Report status changes on `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<StatusEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn integration(&self) -> &Arc<I> {
        &self.integration
    }

    /// Refresh the integration once, then poll every session
    pub async fn fetch(&self, sessions: &[Session]) -> HashMap<String, SessionStatus> {
        self.integration.refresh().await;

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for session in sessions {
            let integration = Arc::clone(&self.integration);
            let semaphore = Arc::clone(&semaphore);
            let session = session.clone();
            let deadline = self.task_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let error = MonitorError::Aborted(session.id.clone());
                    return (session.id, SessionStatus::failed(error));
                };

                let status = poll_session(integration.as_ref(), &session, deadline).await;
                (session.id, status)
            });
        }

        let mut results = HashMap::with_capacity(sessions.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, status)) => {
                    results.insert(id, status);
                }
                Err(err) => warn!(error = %err, "status poll task failed"),
            }
        }

        // Sessions whose task died without reporting
        for session in sessions {
            results
                .entry(session.id.clone())
                .or_insert_with(|| SessionStatus::failed(MonitorError::Aborted(session.id.clone())));
        }

        self.emit_changes(&results);
        results
    }

    fn emit_changes(&self, results: &HashMap<String, SessionStatus>) {
        let mut previous = self.previous.lock();
        previous.retain(|id, _| results.contains_key(id));

        for (id, status) in results {
            let new = status.status();
            let Some(old) = previous.insert(id.clone(), new) else {
                continue;
            };
            if old == new {
                continue;
            }

            info!(session = %id, %old, %new, "session status changed");
            if let Some(tx) = &self.events {
                let event = StatusEvent {
                    session_id: id.clone(),
                    old,
                    new,
                };
                if tx.send(event).is_err() {
                    debug!("status event receiver dropped");
                }
            }
        }
    }
}

/// Poll one session within `deadline`. The chosen window's result survives a
/// breakdown that runs out of time; only the breakdown is dropped.
async fn poll_session<I: StatusIntegration>(
    integration: &I,
    session: &Session,
    deadline: Duration,
) -> SessionStatus {
    let expires = Instant::now() + deadline;

    let (window, result) = match timeout_at(expires, poll_primary(integration, session)).await {
        Ok(Some(polled)) => polled,
        Ok(None) => {
            debug!(session = %session.id, "no tmux window found");
            return SessionStatus::missing();
        }
        Err(_) => {
            warn!(session = %session.id, after = ?deadline, "status poll timed out");
            return SessionStatus::failed(MonitorError::Timeout {
                session: session.id.clone(),
                after: deadline,
            });
        }
    };

    let windows = match timeout_at(expires, poll_breakdown(integration, &window, &result)).await {
        Ok(windows) => windows,
        Err(_) => {
            warn!(session = %session.id, "window breakdown timed out, reporting chosen window only");
            None
        }
    };

    SessionStatus { result, windows }
}

async fn poll_primary<I: StatusIntegration>(
    integration: &I,
    session: &Session,
) -> Option<(WindowInfo, StatusResult)> {
    let window = integration.discover(session)?;
    let result = window_status(integration, &window).await;
    Some((window, result))
}

/// Per-window results when the session has several monitored windows
async fn poll_breakdown<I: StatusIntegration>(
    integration: &I,
    window: &WindowInfo,
    result: &StatusResult,
) -> Option<Vec<StatusResult>> {
    let windows = integration.windows(window)?;
    if windows.len() <= 1 {
        return None;
    }

    let mut per_window = Vec::with_capacity(windows.len());
    for other in &windows {
        if other.key() == window.key() {
            per_window.push(result.clone());
        } else {
            per_window.push(window_status(integration, other).await);
        }
    }
    Some(per_window)
}

async fn window_status<I: StatusIntegration>(integration: &I, window: &WindowInfo) -> StatusResult {
    match integration.status(window).await {
        Ok(result) => result,
        Err(error) => StatusResult {
            window: Some(window.key()),
            window_name: window.name.clone(),
            ..StatusResult::failed(error)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::testing::{window, FakeMux};
    use crate::tmux::{TmuxIntegration, TmuxSettings};

    const IDLE: &str = "✻ Welcome to Claude Code\n\n❯ \n  ? for shortcuts\n";
    const APPROVAL: &str = "✻ Welcome to Claude Code\n\n Do you want to proceed?\n ❯ 1. Yes\n";

    fn integration(preferred: &[&str]) -> Arc<TmuxIntegration<FakeMux>> {
        let settings = TmuxSettings {
            preferred_windows: preferred
                .iter()
                .map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().unwrap())
                .collect(),
            ..TmuxSettings::default()
        };
        Arc::new(TmuxIntegration::new(FakeMux::new(), settings))
    }

    fn session(name: &str) -> Session {
        Session::new(name, name, format!("/src/{}", name))
    }

    #[tokio::test]
    async fn test_partial_failures_stay_per_session() {
        let integration = integration(&[]);
        let mux = integration.multiplexer();
        mux.set_windows(vec![
            window("good", 0, "claude", "/src/good", 1),
            window("broken", 0, "claude", "/src/broken", 1),
        ]);
        mux.set_pane("good:0.0", IDLE);
        mux.fail_pane("broken:0.0", "can't find pane");

        let fetcher = BatchStatusFetcher::new(Arc::clone(&integration), 4, DEFAULT_TASK_TIMEOUT);
        let results = fetcher
            .fetch(&[session("good"), session("broken"), session("absent")])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["good"].status(), Status::Ready);
        assert!(results["good"].result.error.is_none());

        let broken = &results["broken"].result;
        assert_eq!(broken.status, Status::Missing);
        assert!(matches!(broken.error, Some(MonitorError::Capture { .. })));
        assert_eq!(broken.window_name, "claude");

        let absent = &results["absent"].result;
        assert_eq!(absent.status, Status::Missing);
        assert!(absent.error.is_none());
    }

    #[tokio::test]
    async fn test_slow_session_times_out_alone() {
        let integration = integration(&[]);
        let mux = integration.multiplexer();
        mux.set_windows(vec![
            window("fast", 0, "claude", "/src/fast", 1),
            window("slow", 0, "claude", "/src/slow", 1),
        ]);
        mux.set_pane("fast:0.0", IDLE);
        mux.set_pane("slow:0.0", IDLE);
        mux.delay_pane("slow:0.0", Duration::from_secs(5));

        let fetcher = BatchStatusFetcher::new(Arc::clone(&integration), 4, Duration::from_millis(100));
        let results = fetcher.fetch(&[session("fast"), session("slow")]).await;

        assert_eq!(results["fast"].status(), Status::Ready);
        assert!(matches!(
            results["slow"].result.error,
            Some(MonitorError::Timeout { ref session, .. }) if session == "slow"
        ));
    }

    #[tokio::test]
    async fn test_worker_ceiling_bounds_concurrency() {
        let integration = integration(&[]);
        let mux = integration.multiplexer();
        let names: Vec<String> = (0..6).map(|i| format!("s{}", i)).collect();
        mux.set_windows(
            names
                .iter()
                .map(|n| window(n, 0, "claude", &format!("/src/{}", n), 1))
                .collect(),
        );
        for name in &names {
            let target = format!("{}:0.0", name);
            mux.set_pane(&target, IDLE);
            mux.delay_pane(&target, Duration::from_millis(30));
        }

        let sessions: Vec<Session> = names.iter().map(|n| session(n)).collect();
        let fetcher = BatchStatusFetcher::new(Arc::clone(&integration), 2, DEFAULT_TASK_TIMEOUT);
        let results = fetcher.fetch(&sessions).await;

        assert_eq!(results.len(), 6);
        assert!(results.values().all(|s| s.status() == Status::Ready));
        assert!(mux.max_in_flight() <= 2, "in flight: {}", mux.max_in_flight());
    }

    #[tokio::test]
    async fn test_window_breakdown_only_for_multi_window_sessions() {
        let integration = integration(&["claude"]);
        let mux = integration.multiplexer();
        mux.set_windows(vec![
            window("multi", 0, "claude", "/src/multi", 5),
            window("multi", 1, "claude-review", "/src/multi/review", 9),
            window("multi", 2, "vim", "/src/multi", 20),
            window("single", 0, "claude", "/src/single", 1),
        ]);
        mux.set_pane("multi:0.0", IDLE);
        mux.set_pane("multi:1.0", APPROVAL);
        mux.set_pane("single:0.0", IDLE);

        let fetcher = BatchStatusFetcher::new(Arc::clone(&integration), 4, DEFAULT_TASK_TIMEOUT);
        let results = fetcher.fetch(&[session("multi"), session("single")]).await;

        let multi = &results["multi"];
        assert_eq!(multi.result.window_name, "claude");
        let windows = multi.windows.as_ref().unwrap();
        let statuses: Vec<Status> = windows.iter().map(|w| w.status).collect();
        assert_eq!(statuses, vec![Status::Ready, Status::Approval]);
        // The chosen window was captured once, not twice
        assert_eq!(mux.captures("multi:0.0"), 1);

        assert!(results["single"].windows.is_none());
    }

    #[tokio::test]
    async fn test_slow_breakdown_keeps_chosen_window() {
        let integration = integration(&["claude"]);
        let mux = integration.multiplexer();
        mux.set_windows(vec![
            window("multi", 0, "claude", "/src/multi", 5),
            window("multi", 1, "claude-review", "/src/multi/review", 9),
        ]);
        mux.set_pane("multi:0.0", IDLE);
        mux.set_pane("multi:1.0", IDLE);
        mux.delay_pane("multi:1.0", Duration::from_secs(5));

        let fetcher = BatchStatusFetcher::new(Arc::clone(&integration), 4, Duration::from_millis(200));
        let results = fetcher.fetch(&[session("multi")]).await;

        let multi = &results["multi"];
        assert_eq!(multi.status(), Status::Ready);
        assert!(multi.result.error.is_none());
        assert_eq!(multi.result.window_name, "claude");
        assert!(multi.windows.is_none());
    }

    #[tokio::test]
    async fn test_status_changes_are_reported() {
        let integration = integration(&[]);
        let mux = integration.multiplexer();
        mux.set_windows(vec![window("proj", 0, "claude", "/src/proj", 1)]);
        mux.set_pane("proj:0.0", IDLE);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetcher =
            BatchStatusFetcher::new(Arc::clone(&integration), 4, DEFAULT_TASK_TIMEOUT).with_events(tx);
        let sessions = [session("proj")];

        fetcher.fetch(&sessions).await;
        assert!(rx.try_recv().is_err());

        mux.set_windows(vec![window("proj", 0, "claude", "/src/proj", 2)]);
        mux.set_pane("proj:0.0", APPROVAL);
        fetcher.fetch(&sessions).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            StatusEvent {
                session_id: "proj".to_string(),
                old: Status::Ready,
                new: Status::Approval,
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
