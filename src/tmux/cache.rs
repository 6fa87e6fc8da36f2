use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::heuristics::Tool;
use super::registry::Classification;
use super::{Status, WindowInfo, WindowKey};

/// Metadata key carrying an explicit tmux session name for a session
pub const METADATA_TMUX_SESSION: &str = "tmux_session";

/// How long a refreshed cache is trusted for discovery
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(2);

/// What was last read from a window and how it was classified
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureState {
    /// Raw pane text of the last capture
    pub text: Option<String>,
    /// Window activity marker at the time of that capture
    pub activity: Option<u64>,
    pub status: Option<Status>,
    pub tool: Option<Tool>,
    pub active_since: Option<Instant>,
}

/// A cached window plus its capture continuity data
#[derive(Debug)]
pub struct WindowSnapshot {
    info: WindowInfo,
    capture: Mutex<CaptureState>,
}

impl WindowSnapshot {
    #[cfg(test)]
    pub fn new(info: WindowInfo) -> Self {
        Self::with_capture(info, CaptureState::default())
    }

    pub fn with_capture(info: WindowInfo, capture: CaptureState) -> Self {
        Self {
            info,
            capture: Mutex::new(capture),
        }
    }

    pub fn info(&self) -> &WindowInfo {
        &self.info
    }

    pub fn capture(&self) -> CaptureState {
        self.capture.lock().clone()
    }

    /// Store a fresh capture and, when the text was classified, its result
    pub fn record_capture(&self, text: String, activity: u64, classification: Option<Classification>) {
        let mut capture = self.capture.lock();
        capture.text = Some(text);
        capture.activity = Some(activity);
        if let Some(classification) = classification {
            capture.status = Some(classification.status);
            capture.tool = Some(classification.tool);
            capture.active_since = classification.active_since;
        }
    }
}

/// Windows of one tmux session, ordered by index, at most one per index
#[derive(Debug, Default)]
pub struct SessionWindowSet {
    windows: Vec<WindowSnapshot>,
}

impl SessionWindowSet {
    /// Add a window, replacing any existing entry with the same index
    pub fn insert(&mut self, snapshot: WindowSnapshot) {
        match self
            .windows
            .binary_search_by_key(&snapshot.info.index, |w| w.info.index)
        {
            Ok(pos) => self.windows[pos] = snapshot,
            Err(pos) => self.windows.insert(pos, snapshot),
        }
    }

    pub fn get(&self, index: u32) -> Option<&WindowSnapshot> {
        self.windows
            .binary_search_by_key(&index, |w| w.info.index)
            .ok()
            .map(|pos| &self.windows[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowSnapshot> {
        self.windows.iter()
    }

    pub fn infos(&self) -> Vec<WindowInfo> {
        self.windows.iter().map(|w| w.info.clone()).collect()
    }
}

/// One immutable refresh result. Replaced wholesale, never edited in place
/// (apart from each window's capture slot).
#[derive(Debug, Default)]
pub struct CacheGeneration {
    serial: u64,
    /// `None` for an empty or invalidated cache
    refreshed_at: Option<Instant>,
    sessions: HashMap<String, SessionWindowSet>,
}

impl CacheGeneration {
    pub fn new(serial: u64, refreshed_at: Instant, sessions: HashMap<String, SessionWindowSet>) -> Self {
        Self {
            serial,
            refreshed_at: Some(refreshed_at),
            sessions,
        }
    }

    #[cfg(test)]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_fresh_at(&self, now: Instant, freshness: Duration) -> bool {
        self.refreshed_at
            .is_some_and(|at| now.saturating_duration_since(at) <= freshness)
    }

    pub fn session(&self, name: &str) -> Option<&SessionWindowSet> {
        self.sessions.get(name)
    }

    pub fn window(&self, key: &WindowKey) -> Option<&WindowSnapshot> {
        self.sessions.get(&key.session)?.get(key.index)
    }

    /// Session names in sorted order
    pub fn session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub fn sessions(&self) -> impl Iterator<Item = (&String, &SessionWindowSet)> {
        self.sessions.iter()
    }

    /// Resolve a dashboard session to a tmux session name.
    ///
    /// Order: explicit name in metadata, exact slug, then `slug_`/`slug-`
    /// prefix (lexicographically first on ties).
    pub fn discover(&self, slug: &str, metadata: &HashMap<String, String>) -> Option<String> {
        if let Some(name) = metadata.get(METADATA_TMUX_SESSION) {
            if self.sessions.contains_key(name) {
                return Some(name.clone());
            }
        }

        if slug.is_empty() {
            return None;
        }

        if self.sessions.contains_key(slug) {
            return Some(slug.to_string());
        }

        let underscore = format!("{}_", slug);
        let dash = format!("{}-", slug);
        self.sessions
            .keys()
            .filter(|name| name.starts_with(&underscore) || name.starts_with(&dash))
            .min()
            .cloned()
    }
}

/// Snapshot of every tmux window, swapped atomically on refresh.
///
/// Readers clone the current `Arc` and work on that generation; a concurrent
/// refresh never exposes a half-built map.
#[derive(Debug)]
pub struct WindowCache {
    current: RwLock<Arc<CacheGeneration>>,
    freshness: Duration,
}

impl WindowCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheGeneration::default())),
            freshness,
        }
    }

    pub fn snapshot(&self) -> Arc<CacheGeneration> {
        self.current.read().clone()
    }

    pub fn install(&self, generation: CacheGeneration) {
        *self.current.write() = Arc::new(generation);
    }

    /// Build the next generation from the current one and install it, with
    /// writers held off for the whole step so nothing recorded against the
    /// old generation is lost.
    pub fn rebuild(&self, build: impl FnOnce(&CacheGeneration) -> CacheGeneration) {
        let mut current = self.current.write();
        let next = build(&current);
        *current = Arc::new(next);
    }

    /// Run `f` against the current generation, holding off `rebuild` until
    /// it returns
    pub fn with_current<R>(&self, f: impl FnOnce(&CacheGeneration) -> R) -> R {
        let current = self.current.read();
        f(&current)
    }

    /// Drop everything and mark the cache stale
    pub fn clear(&self) {
        self.install(CacheGeneration::default());
    }

    pub fn is_fresh(&self) -> bool {
        self.snapshot().is_fresh_at(Instant::now(), self.freshness)
    }

    /// Tmux session for a slug, or `None` when nothing matches or the cache
    /// is too old to trust. `None` means "try again next cycle".
    pub fn discover_session(&self, slug: &str, metadata: &HashMap<String, String>) -> Option<String> {
        self.discover_session_at(slug, metadata, Instant::now())
    }

    pub fn discover_session_at(
        &self,
        slug: &str,
        metadata: &HashMap<String, String>,
        now: Instant,
    ) -> Option<String> {
        let generation = self.snapshot();
        if !generation.is_fresh_at(now, self.freshness) {
            return None;
        }
        generation.discover(slug, metadata)
    }

    /// Windows cached for a tmux session
    pub fn windows(&self, session: &str) -> Vec<WindowInfo> {
        self.snapshot()
            .session(session)
            .map(SessionWindowSet::infos)
            .unwrap_or_default()
    }
}

impl Default for WindowCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn info(session: &str, index: u32, activity: u64) -> WindowInfo {
        WindowInfo {
            session_name: session.to_string(),
            index,
            name: format!("w{}", index),
            work_dir: "/tmp".to_string(),
            activity,
        }
    }

    fn generation(serial: u64, names: &[&str]) -> CacheGeneration {
        let mut sessions = HashMap::new();
        for name in names {
            let mut set = SessionWindowSet::default();
            set.insert(WindowSnapshot::new(info(name, 0, serial)));
            set.insert(WindowSnapshot::new(info(name, 1, serial)));
            sessions.insert(name.to_string(), set);
        }
        CacheGeneration::new(serial, Instant::now(), sessions)
    }

    #[test]
    fn test_window_set_replaces_same_index() {
        let mut set = SessionWindowSet::default();
        set.insert(WindowSnapshot::new(info("s", 2, 1)));
        set.insert(WindowSnapshot::new(info("s", 0, 1)));
        set.insert(WindowSnapshot::new(info("s", 2, 7)));
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.get(2).unwrap().info().activity, 7);
        let order: Vec<u32> = set.iter().map(|w| w.info().index).collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn test_discover_resolution_order() {
        let cache = WindowCache::default();
        cache.install(generation(1, &["api", "api_2", "web-main", "web_old", "misc"]));

        let mut metadata = HashMap::new();
        metadata.insert(METADATA_TMUX_SESSION.to_string(), "misc".to_string());
        assert_eq!(cache.discover_session("api", &metadata).as_deref(), Some("misc"));

        let none = HashMap::new();
        assert_eq!(cache.discover_session("api", &none).as_deref(), Some("api"));
        assert_eq!(cache.discover_session("web", &none).as_deref(), Some("web-main"));
        assert_eq!(cache.discover_session("nope", &none), None);
        assert_eq!(cache.discover_session("", &none), None);
    }

    #[test]
    fn test_unknown_explicit_name_falls_through() {
        let cache = WindowCache::default();
        cache.install(generation(1, &["api"]));
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_TMUX_SESSION.to_string(), "gone".to_string());
        assert_eq!(cache.discover_session("api", &metadata).as_deref(), Some("api"));
    }

    #[test]
    fn test_stale_cache_discovers_nothing() {
        let cache = WindowCache::default();
        cache.install(generation(1, &["api"]));
        let later = Instant::now() + Duration::from_secs(3);
        assert_eq!(cache.discover_session_at("api", &HashMap::new(), later), None);

        cache.clear();
        assert!(!cache.is_fresh());
        assert_eq!(cache.discover_session("api", &HashMap::new()), None);
    }

    #[test]
    fn test_rebuild_sees_writes_made_before_it() {
        let cache = WindowCache::default();
        cache.install(generation(1, &["a"]));
        let key = WindowKey::new("a", 0);

        cache.with_current(|generation| {
            generation
                .window(&key)
                .unwrap()
                .record_capture("text".to_string(), 9, None)
        });
        cache.rebuild(|prior| {
            let mut set = SessionWindowSet::default();
            let old = prior.window(&key).unwrap();
            set.insert(WindowSnapshot::with_capture(old.info().clone(), old.capture()));
            let mut sessions = HashMap::new();
            sessions.insert("a".to_string(), set);
            CacheGeneration::new(prior.serial() + 1, Instant::now(), sessions)
        });

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.serial(), 2);
        let capture = snapshot.window(&key).unwrap().capture();
        assert_eq!(capture.text.as_deref(), Some("text"));
        assert_eq!(capture.activity, Some(9));
    }

    #[test]
    fn test_readers_never_see_mixed_generations() {
        let cache = Arc::new(WindowCache::default());
        cache.install(generation(0, &["a", "b", "c"]));

        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for serial in 1..500 {
                    cache.install(generation(serial, &["a", "b", "c"]));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let generation = cache.snapshot();
                        let serial = generation.serial();
                        for (_, set) in generation.sessions() {
                            for window in set.iter() {
                                assert_eq!(window.info().activity, serial);
                            }
                        }
                        assert_eq!(generation.session_names().len(), 3);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
