use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, trace, warn};

use super::cache::{CacheGeneration, CaptureState, SessionWindowSet, WindowCache, WindowSnapshot};
use super::client::Multiplexer;
use super::normalize::normalize;
use super::registry::WindowRegistry;
use super::select::{disambiguate_window, retain_preferred};
use super::{Status, StatusResult, WindowInfo, WindowKey};
use crate::error::MonitorError;
use crate::session::Session;

/// Tunables for the tmux side of the monitor
#[derive(Debug, Clone)]
pub struct TmuxSettings {
    /// Window names worth monitoring when a session has several windows
    pub preferred_windows: Vec<Regex>,
    pub hysteresis: Duration,
    pub captures_per_second: u32,
    /// How long a refreshed cache is trusted for discovery
    pub cache_freshness: Duration,
    /// Refreshes a window may be absent before its state is dropped
    pub sweep_after_refreshes: u64,
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            preferred_windows: Vec::new(),
            hysteresis: super::tracker::DEFAULT_HYSTERESIS,
            captures_per_second: super::limiter::DEFAULT_CAPTURES_PER_SECOND,
            cache_freshness: super::cache::DEFAULT_FRESHNESS,
            sweep_after_refreshes: 10,
        }
    }
}

/// Counters for the capture pipeline
#[derive(Debug, Default)]
pub struct CaptureStats {
    captures: AtomicU64,
    capture_failures: AtomicU64,
    rate_limited: AtomicU64,
    unchanged_activity: AtomicU64,
    unchanged_text: AtomicU64,
    classifications: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub captures: u64,
    pub capture_failures: u64,
    pub rate_limited: u64,
    pub unchanged_activity: u64,
    pub unchanged_text: u64,
    pub classifications: u64,
}

impl CaptureStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captures: self.captures.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            unchanged_activity: self.unchanged_activity.load(Ordering::Relaxed),
            unchanged_text: self.unchanged_text.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
        }
    }
}

/// Status source backed by a terminal multiplexer.
///
/// Owns the window cache and the per-window tracker/limiter registry, and
/// decides for each status request whether a pane capture is worth making.
pub struct TmuxIntegration<M> {
    mux: M,
    cache: WindowCache,
    registry: WindowRegistry,
    settings: TmuxSettings,
    stats: CaptureStats,
    /// Serializes refreshes so an older listing never replaces a newer one
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<M: Multiplexer> TmuxIntegration<M> {
    pub fn new(mux: M, settings: TmuxSettings) -> Self {
        Self {
            mux,
            cache: WindowCache::new(settings.cache_freshness),
            registry: WindowRegistry::new(settings.hysteresis, settings.captures_per_second),
            settings,
            stats: CaptureStats::default(),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn multiplexer(&self) -> &M {
        &self.mux
    }

    pub fn cache(&self) -> &WindowCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Rebuild the window cache from one `list-windows` call.
    ///
    /// A failed listing empties the cache and marks it stale; callers only
    /// need the error for logging.
    pub async fn refresh_cache(&self) -> Result<(), MonitorError> {
        let _refreshing = self.refresh_lock.lock().await;

        let windows = match self.mux.list_windows().await {
            Ok(windows) => windows,
            Err(err) => {
                let message = format!("{:#}", err);
                warn!(error = %message, "tmux window listing failed, clearing cache");
                self.cache.clear();
                return Err(MonitorError::MultiplexerUnavailable(message));
            }
        };

        let mut grouped: HashMap<String, Vec<WindowInfo>> = HashMap::new();
        for window in windows {
            grouped
                .entry(window.session_name.clone())
                .or_default()
                .push(window);
        }
        let retained: Vec<(String, Vec<WindowInfo>)> = grouped
            .into_iter()
            .map(|(name, windows)| (name, retain_preferred(windows, &self.settings.preferred_windows)))
            .collect();

        let keys: Vec<WindowKey> = retained
            .iter()
            .flat_map(|(_, windows)| windows.iter().map(WindowInfo::key))
            .collect();
        let serial = self.registry.mark_seen(keys.iter());
        self.registry.sweep(self.settings.sweep_after_refreshes);

        let session_count = retained.len();
        self.cache.rebuild(|prior| {
            let mut sessions = HashMap::with_capacity(retained.len());
            for (name, windows) in retained {
                let mut set = SessionWindowSet::default();
                for info in windows {
                    let capture = prior
                        .window(&info.key())
                        .map(WindowSnapshot::capture)
                        .unwrap_or_default();
                    set.insert(WindowSnapshot::with_capture(info, capture));
                }
                sessions.insert(name, set);
            }
            CacheGeneration::new(serial, Instant::now(), sessions)
        });
        trace!(
            serial,
            sessions = session_count,
            windows = keys.len(),
            tracked = self.registry.len(),
            "window cache refreshed"
        );
        Ok(())
    }

    pub fn discover_session(&self, slug: &str, metadata: &HashMap<String, String>) -> Option<String> {
        self.cache.discover_session(slug, metadata)
    }

    /// The window to report for a session, if its tmux session is known
    pub fn resolve_window(&self, session: &Session) -> Option<WindowInfo> {
        let slug = session.slug();
        let name = self.discover_session(&slug, &session.metadata)?;
        let windows = self.cache.windows(&name);
        disambiguate_window(&windows, &session.path, &slug).cloned()
    }

    /// Monitored windows of a tmux session, ordered by index
    pub fn session_windows(&self, session_name: &str) -> Vec<WindowInfo> {
        self.cache.windows(session_name)
    }

    /// Status of one window, capturing its pane only when that can change
    /// the answer.
    pub async fn get_status(&self, window: &WindowInfo) -> Result<StatusResult, MonitorError> {
        let key = window.key();
        let (info, prior) = {
            let generation = self.cache.snapshot();
            match generation.window(&key) {
                Some(snapshot) => (snapshot.info().clone(), snapshot.capture()),
                None => (window.clone(), CaptureState::default()),
            }
        };

        if prior.text.is_some() && prior.activity == Some(info.activity) {
            CaptureStats::bump(&self.stats.unchanged_activity);
            return Ok(cached_result(info, prior));
        }

        if !self.registry.allow_capture(&key) {
            CaptureStats::bump(&self.stats.rate_limited);
            trace!(window = %key, "capture rate limited, using cached content");
            return Ok(cached_result(info, prior));
        }

        CaptureStats::bump(&self.stats.captures);
        let target = info.pane_target();
        let text = match self.mux.capture_pane(&target).await {
            Ok(text) => text,
            Err(err) => {
                CaptureStats::bump(&self.stats.capture_failures);
                let message = format!("{:#}", err);
                warn!(window = %key, error = %message, "pane capture failed");
                return Err(MonitorError::Capture { target, message });
            }
        };

        if prior.text.as_deref() == Some(text.as_str()) {
            CaptureStats::bump(&self.stats.unchanged_text);
            self.write_back(&key, text, info.activity, None);
            return Ok(cached_result(info, prior));
        }

        CaptureStats::bump(&self.stats.classifications);
        let classification = self
            .registry
            .classify(&key, &normalize(&text), info.activity);

        if prior.status != Some(classification.status) {
            debug!(
                window = %key,
                from = ?prior.status,
                to = %classification.status,
                tool = classification.tool.name(),
                "window status changed"
            );
        }

        self.write_back(&key, text.clone(), info.activity, Some(classification));

        Ok(StatusResult {
            status: classification.status,
            tool: Some(classification.tool),
            window: Some(key),
            window_name: info.name,
            content: text,
            active_since: classification.active_since,
            error: None,
        })
    }

    /// Store a capture in whatever generation is current now; a refresh may
    /// have swapped the cache while the capture was running.
    fn write_back(
        &self,
        key: &WindowKey,
        text: String,
        activity: u64,
        classification: Option<super::registry::Classification>,
    ) {
        self.cache.with_current(|generation| match generation.window(key) {
            Some(snapshot) => snapshot.record_capture(text, activity, classification),
            None => trace!(window = %key, "window left the cache during capture"),
        });
    }
}

fn cached_result(info: WindowInfo, capture: CaptureState) -> StatusResult {
    StatusResult {
        status: capture.status.unwrap_or(Status::Ready),
        tool: capture.tool,
        window: Some(info.key()),
        window_name: info.name,
        content: capture.text.unwrap_or_default(),
        active_since: capture.active_since,
        error: None,
    }
}
