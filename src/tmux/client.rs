use std::future::Future;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::trace;

use super::WindowInfo;

/// Fields requested from `list-windows`, tab separated
const LIST_WINDOWS_FORMAT: &str =
    "#{session_name}\t#{window_index}\t#{window_name}\t#{pane_current_path}\t#{window_activity}";

/// The two multiplexer calls the monitor depends on
pub trait Multiplexer: Send + Sync + 'static {
    /// Every window of every session in one call
    fn list_windows(&self) -> impl Future<Output = Result<Vec<WindowInfo>>> + Send;

    /// Visible text of a pane, addressed as `session:window.pane`
    fn capture_pane(&self, target: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Client for interacting with tmux via CLI
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self::with_path("tmux")
    }

    pub fn with_path(tmux_path: impl Into<String>) -> Self {
        Self {
            tmux_path: tmux_path.into(),
        }
    }

    /// Check if tmux server is running
    pub async fn is_server_running(&self) -> bool {
        Command::new(&self.tmux_path)
            .arg("list-sessions")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the command to attach to a window (for external execution)
    pub fn attach_command(&self, target: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            target.to_string(),
        ]
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for TmuxClient {
    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let output = Command::new(&self.tmux_path)
            .args(["list-windows", "-a", "-F", LIST_WINDOWS_FORMAT])
            .output()
            .await
            .context("Failed to execute tmux list-windows")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-windows failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_window_line).collect())
    }

    async fn capture_pane(&self, target: &str) -> Result<String> {
        let output = Command::new(&self.tmux_path)
            .args(["capture-pane", "-p", "-J", "-t", target])
            .output()
            .await
            .context("Failed to capture pane")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux capture-pane -t {} failed: {}", target, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse one `list-windows` line; malformed lines are skipped
pub(crate) fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 5 {
        trace!(line, "skipping malformed list-windows line");
        return None;
    }

    let index = parts[1].parse().ok()?;
    let activity = parts[4].trim().parse().unwrap_or(0);

    Some(WindowInfo {
        session_name: parts[0].to_string(),
        index,
        name: parts[2].to_string(),
        work_dir: parts[3].to_string(),
        activity,
    })
}
