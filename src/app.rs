use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::actions::Action;
use crate::session::Session;
use crate::status::{SessionStatus, StatusEvent};
use crate::tmux::{Status, StatusResult};

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg: Color::Rgb(30, 30, 30),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

impl Theme {
    fn status_color(&self, result: &StatusResult) -> Color {
        if result.error.is_some() {
            return self.error;
        }
        match result.status {
            Status::Missing => self.dim,
            Status::Ready => self.success,
            Status::Active => self.warning,
            Status::Approval => self.accent,
        }
    }
}

/// One dashboard line: a session and its latest poll result
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session: Session,
    pub status: SessionStatus,
}

/// Most recent status change seen for a session
#[derive(Debug, Clone)]
struct Change {
    event: StatusEvent,
    at: Instant,
}

/// Main application state
pub struct App {
    /// Sessions from the latest sweep, in display order
    pub rows: Vec<SessionRow>,
    /// Currently selected session index
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub error_message: Option<String>,
    /// Theme
    pub theme: Theme,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
    last_changes: HashMap<String, Change>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            rows: Vec::new(),
            list_state,
            error_message: None,
            theme: Theme::default(),
            pending_actions: Vec::new(),
            last_changes: HashMap::new(),
        }
    }

    /// Get the currently selected row
    pub fn selected_row(&self) -> Option<&SessionRow> {
        self.list_state.selected().and_then(|i| self.rows.get(i))
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::StatusesUpdated(rows) => {
                self.rows = rows;
                // Ensure selection is valid
                if let Some(selected) = self.list_state.selected() {
                    if selected >= self.rows.len() && !self.rows.is_empty() {
                        self.list_state.select(Some(self.rows.len() - 1));
                    }
                }
                Ok(false)
            }
            Action::StatusChanged(event) => {
                self.last_changes.insert(
                    event.session_id.clone(),
                    Change {
                        event,
                        at: Instant::now(),
                    },
                );
                Ok(false)
            }
            Action::Error(msg) => {
                self.error_message = Some(msg);
                Ok(false)
            }
            Action::AttachSession(_) => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear error message on any key press
        self.error_message = None;

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_row(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_row(),
            KeyCode::Enter => self.attach_selected(),
            _ => {}
        }
        Ok(false)
    }

    fn attach_selected(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        match &row.status.result.window {
            Some(key) => {
                let target = key.to_string();
                self.pending_actions.push(Action::AttachSession(target));
            }
            None => {
                self.error_message =
                    Some(format!("No tmux window found for '{}'", row.session.title));
            }
        }
    }

    fn next_row(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.rows.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_row(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.rows.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        frame.render_widget(
            Block::default().style(Style::default().bg(self.theme.bg)),
            frame.area(),
        );
        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let counts = |status: Status| self.rows.iter().filter(|r| r.status.status() == status).count();

        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " agent-watch ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("│ ", Style::default().fg(self.theme.dim)),
            Span::styled(
                format!("{} active ", counts(Status::Active)),
                Style::default().fg(self.theme.warning),
            ),
            Span::styled(
                format!("{} waiting ", counts(Status::Approval)),
                Style::default().fg(self.theme.accent),
            ),
            Span::styled(
                format!("{} ready", counts(Status::Ready)),
                Style::default().fg(self.theme.success),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40), // Session list
                Constraint::Percentage(60), // Detail pane
            ])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.rows.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No sessions found. Waiting for tmux...",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.rows
                .iter()
                .map(|row| {
                    let result = &row.status.result;
                    let icon = Span::styled(
                        format!("{} ", status_glyph(result)),
                        Style::default().fg(self.theme.status_color(result)),
                    );
                    let name = Span::styled(&row.session.title, Style::default().fg(self.theme.fg));

                    let mut spans = vec![icon, name];
                    if let Some(tool) = result.tool {
                        spans.push(Span::styled(
                            format!("  {}", tool.name()),
                            Style::default().fg(self.theme.dim),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Sessions ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn detail_line<'a>(&self, label: &'a str, value: String, color: Color) -> Line<'a> {
        Line::from(vec![
            Span::styled(label, Style::default().fg(self.theme.dim)),
            Span::styled(value, Style::default().fg(color)),
        ])
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let content = match self.selected_row() {
            Some(row) => self.detail_lines(row),
            None => vec![Line::from(Span::styled(
                "No session selected",
                Style::default().fg(self.theme.dim),
            ))],
        };

        let detail = Paragraph::new(content).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn detail_lines(&self, row: &SessionRow) -> Vec<Line<'static>> {
        let result = &row.status.result;
        let fg = self.theme.fg;
        let now = Instant::now();

        let target = match &result.window {
            Some(key) => format!("{} ({})", key, result.window_name),
            None => "-".to_string(),
        };
        let mut lines = vec![
            self.detail_line("Session: ", row.session.title.clone(), fg),
            self.detail_line("Path: ", row.session.path.clone(), fg),
            self.detail_line("Target: ", target, fg),
            self.detail_line(
                "Tool: ",
                result.tool.map(|t| t.name().to_string()).unwrap_or_else(|| "-".to_string()),
                fg,
            ),
            self.detail_line(
                "Status: ",
                result.status.to_string(),
                self.theme.status_color(result),
            ),
        ];

        if let (Status::Active, Some(since)) = (result.status, result.active_since) {
            lines.push(self.detail_line(
                "Active for: ",
                format_elapsed(now.saturating_duration_since(since)),
                self.theme.warning,
            ));
        }

        if let Some(error) = &result.error {
            lines.push(self.detail_line("Error: ", error.to_string(), self.theme.error));
        }

        if let Some(change) = self.last_changes.get(&row.session.id) {
            lines.push(self.detail_line(
                "Last change: ",
                format!(
                    "{} → {} ({} ago)",
                    change.event.old,
                    change.event.new,
                    format_elapsed(now.saturating_duration_since(change.at))
                ),
                fg,
            ));
        }

        if let Some(windows) = &row.status.windows {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Windows:",
                Style::default().fg(self.theme.dim),
            )));
            for window in windows {
                let label = window
                    .window
                    .as_ref()
                    .map(|key| key.to_string())
                    .unwrap_or_default();
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("  {} ", status_glyph(window)),
                        Style::default().fg(self.theme.status_color(window)),
                    ),
                    Span::styled(
                        format!("{} {} ", label, window.window_name),
                        Style::default().fg(fg),
                    ),
                    Span::styled(window.status.to_string(), Style::default().fg(self.theme.dim)),
                ]));
            }
        }

        let recent = recent_output(&result.content, RECENT_OUTPUT_LINES);
        if !recent.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Recent output:",
                Style::default().fg(self.theme.dim),
            )));
            for line in recent {
                lines.push(Line::from(Span::styled(
                    format!("  {}", line),
                    Style::default().fg(self.theme.dim),
                )));
            }
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Press Enter to attach",
            Style::default().fg(self.theme.dim),
        )));
        lines
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ Enter: Attach ";

        let content = match self.error_message {
            Some(ref msg) => Line::from(Span::styled(
                format!(" {} ", msg),
                Style::default().fg(self.theme.error),
            )),
            None => Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim))),
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }
}

fn status_glyph(result: &StatusResult) -> &'static str {
    if result.error.is_some() {
        return "✗";
    }
    match result.status {
        Status::Missing => "○",
        Status::Ready => "●",
        Status::Active => "◐",
        Status::Approval => "?",
    }
}

/// `45s`, `3m 07s`, `2h 05m`
/// Pane lines shown under the detail pane
const RECENT_OUTPUT_LINES: usize = 5;

/// Last `count` non-blank lines of a capture, oldest first
fn recent_output(content: &str, count: usize) -> Vec<String> {
    let mut recent: Vec<String> = content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .rev()
        .take(count)
        .map(str::to_string)
        .collect();
    recent.reverse();
    recent
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
