use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Status;

/// How many trailing lines of a pane are inspected for state markers
const TAIL_LINES: usize = 20;

/// Agent tool running in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Claude,
    Codex,
    Gemini,
    /// Plain shell or an unrecognised program
    Shell,
}

// Tool identity markers. Searched over the whole pane since banners scroll up.
static RE_IS_CLAUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(claude code|welcome to claude|\? for shortcuts|auto-accept edits|bypassing permissions)")
        .unwrap()
});

static RE_IS_CODEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(openai codex|>_ openai|⏎ send|codex>)").unwrap()
});

static RE_IS_GEMINI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(gemini cli|gemini-\d|type your message or @path)").unwrap());

// Claude Code
static RE_CLAUDE_BUSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(esc to interrupt|ctrl\+c to interrupt|THINKING…|\(STATUS\))").unwrap()
});

static RE_CLAUDE_APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(Do you want to (proceed|make this edit|create|allow|run)|❯\s*1\.\s*Yes|Yes, and don't ask again|Allow (once|always)|Waiting for permission)")
        .unwrap()
});

static RE_CLAUDE_READY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)(^\s*│?\s*[>❯]\s*│?$|\? for shortcuts|^\s*[>❯] Try ")"#).unwrap()
});

// Codex
static RE_CODEX_BUSY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(esc to interrupt|\(STATUS\))").unwrap());

static RE_CODEX_APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(allow command\?|would you like to (run|make) the following|yes, proceed|approve this)")
        .unwrap()
});

static RE_CODEX_READY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^\s*▌|⏎ send|N% context left)").unwrap());

// Gemini CLI
static RE_GEMINI_BUSY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(esc to cancel|\(STATUS\))").unwrap());

static RE_GEMINI_APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(apply this change\?|allow execution|yes, allow (once|always)|waiting for user confirmation)")
        .unwrap()
});

static RE_GEMINI_READY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)(type your message|^\s*│?\s*>\s*│?\s*$)").unwrap());

// Plain shell
// Progress words only count at the start of a line, followed by an ellipsis
static RE_SHELL_BUSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(^\s*(?:thinking|processing|loading|working)\s*(?:…|\.{3})|\(STATUS\))").unwrap()
});

static RE_SHELL_APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\[y/n\]|\(y/n\)|press enter to continue|continue\? )").unwrap()
});

static RE_SHELL_READY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[$%#❯>]\s*$").unwrap());

impl Tool {
    /// Identify the tool from marker text in the pane
    pub fn detect(content: &str) -> Tool {
        if RE_IS_CLAUDE.is_match(content) {
            Tool::Claude
        } else if RE_IS_CODEX.is_match(content) {
            Tool::Codex
        } else if RE_IS_GEMINI.is_match(content) {
            Tool::Gemini
        } else {
            Tool::Shell
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Claude => "claude",
            Tool::Codex => "codex",
            Tool::Gemini => "gemini",
            Tool::Shell => "shell",
        }
    }

    /// Agent is working: spinner line or interrupt hint on screen
    pub fn is_busy(&self, content: &str) -> bool {
        let recent = tail(content);
        match self {
            Tool::Claude => RE_CLAUDE_BUSY.is_match(&recent),
            Tool::Codex => RE_CODEX_BUSY.is_match(&recent),
            Tool::Gemini => RE_GEMINI_BUSY.is_match(&recent),
            Tool::Shell => RE_SHELL_BUSY.is_match(&recent),
        }
    }

    /// A permission or confirmation dialog is waiting on the user
    pub fn needs_approval(&self, content: &str) -> bool {
        let recent = tail(content);
        match self {
            Tool::Claude => RE_CLAUDE_APPROVAL.is_match(&recent),
            Tool::Codex => RE_CODEX_APPROVAL.is_match(&recent),
            Tool::Gemini => RE_GEMINI_APPROVAL.is_match(&recent),
            Tool::Shell => RE_SHELL_APPROVAL.is_match(&recent),
        }
    }

    /// Input prompt is showing
    pub fn is_ready(&self, content: &str) -> bool {
        let recent = tail(content);
        match self {
            Tool::Claude => RE_CLAUDE_READY.is_match(&recent),
            Tool::Codex => RE_CODEX_READY.is_match(&recent),
            Tool::Gemini => RE_GEMINI_READY.is_match(&recent),
            Tool::Shell => recent
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map(|line| RE_SHELL_READY.is_match(line))
                .unwrap_or(false),
        }
    }

    /// Status suggested by the markers alone, by priority
    /// approval > busy > ready. `None` when nothing matched.
    pub fn classify(&self, content: &str) -> Option<Status> {
        if self.needs_approval(content) {
            Some(Status::Approval)
        } else if self.is_busy(content) {
            Some(Status::Active)
        } else if self.is_ready(content) {
            Some(Status::Ready)
        } else {
            None
        }
    }
}

fn tail(content: &str) -> String {
    let lines: Vec<&str> = content.lines().rev().take(TAIL_LINES).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}
