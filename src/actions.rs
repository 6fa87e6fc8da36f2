use crossterm::event::KeyEvent;

use crate::app::SessionRow;
use crate::status::StatusEvent;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// A poll sweep finished
    StatusesUpdated(Vec<SessionRow>),
    /// A session changed status since the previous sweep
    StatusChanged(StatusEvent),
    /// An error occurred
    Error(String),
    /// Attach to a tmux window (`session:index`)
    AttachSession(String),
}
