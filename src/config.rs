use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::status::DEFAULT_TASK_TIMEOUT;
use crate::tmux::TmuxSettings;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "AGENT_WATCH_CONFIG";

fn default_preferred_windows() -> Vec<String> {
    ["claude", "codex", "gemini", "agent"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Monitor configuration, read from `config.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Window name patterns, matched case-insensitively
    pub preferred_windows: Vec<String>,
    pub refresh_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub captures_per_second: u32,
    pub hysteresis_ms: u64,
    pub cache_freshness_ms: u64,
    pub session_timeout_ms: u64,
    pub max_workers: usize,
    pub sweep_after_refreshes: u64,
    pub tmux_path: String,
    /// Sessions to watch; empty means one per tmux session
    pub sessions: Vec<Session>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            preferred_windows: default_preferred_windows(),
            refresh_interval_ms: 1500,
            poll_interval_ms: 1000,
            captures_per_second: 2,
            hysteresis_ms: 500,
            cache_freshness_ms: 2000,
            session_timeout_ms: DEFAULT_TASK_TIMEOUT.as_millis() as u64,
            max_workers: 8,
            sweep_after_refreshes: 10,
            tmux_path: "tmux".to_string(),
            sessions: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load from `$AGENT_WATCH_CONFIG` or the user config dir
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        // Reject bad patterns at load time rather than on the first refresh
        config.preferred_patterns()?;
        Ok(config)
    }

    pub fn preferred_patterns(&self) -> Result<Vec<Regex>> {
        self.preferred_windows
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid preferred window pattern '{}'", pattern))
            })
            .collect()
    }

    pub fn tmux_settings(&self) -> Result<TmuxSettings> {
        Ok(TmuxSettings {
            preferred_windows: self.preferred_patterns()?,
            hysteresis: Duration::from_millis(self.hysteresis_ms),
            captures_per_second: self.captures_per_second,
            cache_freshness: Duration::from_millis(self.cache_freshness_ms),
            sweep_after_refreshes: self.sweep_after_refreshes,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("agent-watch").join("config.json"))
}
