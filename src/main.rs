use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::fs::{self, File, OpenOptions};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod actions;
mod app;
mod config;
mod error;
mod session;
mod status;
mod tmux;

use actions::Action;
use app::{App, SessionRow};
use config::MonitorConfig;
use status::{BatchStatusFetcher, StatusEvent};
use tmux::{TmuxClient, TmuxIntegration};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = MonitorConfig::load().context("Failed to load configuration")?;
    let client = TmuxClient::with_path(&config.tmux_path);
    if !client.is_server_running().await {
        info!("tmux server not running yet, waiting for sessions");
    }

    let integration = Arc::new(TmuxIntegration::new(
        client.clone(),
        config.tmux_settings()?,
    ));

    // Create event channels
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StatusEvent>();

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Keep the window cache warm between polls
    let refresher = Arc::clone(&integration);
    let refresh_interval = config.refresh_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        loop {
            ticker.tick().await;
            let _ = refresher.refresh_cache().await;
        }
    });

    // Spawn status poller
    let fetcher = BatchStatusFetcher::new(
        Arc::clone(&integration),
        config.max_workers,
        config.session_timeout(),
    )
    .with_events(event_tx);
    let poll_tx = tx.clone();
    let poll_interval = config.poll_interval();
    let configured = config.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            let integration = fetcher.integration();

            let sessions = if configured.is_empty() {
                session::sessions_from_cache(&integration.cache().snapshot())
            } else {
                configured.clone()
            };

            let mut statuses = fetcher.fetch(&sessions).await;
            debug!(stats = ?integration.stats(), sessions = sessions.len(), "poll sweep finished");

            let rows = sessions
                .into_iter()
                .map(|session| {
                    let status = statuses.remove(&session.id).unwrap_or_default();
                    SessionRow { session, status }
                })
                .collect();
            if poll_tx.send(Action::StatusesUpdated(rows)).is_err() {
                break;
            }

            if !integration.cache().is_fresh() {
                let _ = poll_tx.send(Action::Error("Tmux: server not reachable".to_string()));
            }
        }
    });

    // Forward status changes to the UI
    let change_tx = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if change_tx.send(Action::StatusChanged(event)).is_err() {
                break;
            }
        }
    });

    // Create app state
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        for pending_action in app.take_pending_actions() {
            if let Action::AttachSession(ref target) = pending_action {
                // Suspend TUI and attach to the window
                ratatui::restore();

                let cmd = client.attach_command(target);
                let status = std::process::Command::new(&cmd[0])
                    .args(&cmd[1..])
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status();

                // Resume TUI
                terminal = ratatui::init();

                if let Err(e) = status {
                    warn!(target = %target, error = %e, "attach failed");
                    app.error_message = Some(format!("Failed to attach: {}", e));
                }
            }
        }

        let Some(action) = rx.recv().await else {
            break Ok(());
        };
        match app.handle_action(action) {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    // Restore terminal
    ratatui::restore();
    result
}

/// Log to a file under the local data dir; the terminal belongs to the UI
fn init_logging() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match open_log_file() {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn open_log_file() -> Option<File> {
    let dir = dirs::data_local_dir()?.join("agent-watch");
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("agent-watch.log"))
        .ok()
}
