//! Pane text normalization.
//!
//! Agents redraw their status line many times a second: spinner frames,
//! elapsed-time counters, token counters. None of that is a meaningful change,
//! so it is folded into fixed placeholders before hashing. The result is stable
//! while the agent is doing the same thing and changes when it does something
//! else.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// CSI, OSC and two-byte escape sequences
static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").unwrap()
});

/// Animated spinner glyphs (braille dots, Claude's asterisk frames, quarter circles)
static RE_SPINNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏⠂⠐✳✢✶✻✽◐◓◑◒] ?").unwrap());

/// `Gusting… (35s · ↑ 673 tokens)` style thinking lines
static RE_THINKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\p{L}+(?:…|\.\.\.)\s*\([^()\n]*(?:\d+s\b|tokens?\b|interrupt|esc to)[^()\n]*\)")
        .unwrap()
});

/// `(45s · 1234 tokens · ctrl+c to interrupt)` style status fragments of a
/// running agent
static RE_STATUS_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()\n]*(?:interrupt|esc to)[^()\n]*\)").unwrap());

/// Counters with no interrupt hint, such as a finished task's
/// `(12 tool uses · 33.5k tokens · 1m 2s)` summary
static RE_COUNTER_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()\n]*(?:\d+s\b|\btokens?\b)[^()\n]*\)").unwrap());

static RE_PROGRESS_BAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[=#>\- ]*[=#>][=#>\- ]*\]|[█▓▒░▏▎▍▋▊▉]{2,}").unwrap()
});

static RE_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d+)?%").unwrap());

static RE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\s?(?:[KMGT]i?B|bytes)\b").unwrap());

static RE_CLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm]\b)?").unwrap()
});

static RE_GIT_BRANCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"git:\([^)\n]*\)").unwrap());

static RE_BRANCH_GLYPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"⎇ ?\S+").unwrap());

static RE_TOKEN_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[↑↓] ?\d[\d.,]*k? tokens?").unwrap());

static RE_STATUS_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+ (MCPs?|hooks?)\b").unwrap());

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// Pane text with volatile fragments replaced, plus its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedContent {
    text: String,
    hash: String,
}

impl NormalizedContent {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Hex SHA-256 of the normalized text. Only used to notice changes.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Normalize raw pane text and fingerprint the result
pub fn normalize(raw: &str) -> NormalizedContent {
    let text = normalize_text(raw);
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    NormalizedContent { text, hash }
}

/// Normalization without the hash. Idempotent.
pub fn normalize_text(raw: &str) -> String {
    let text = RE_ANSI.replace_all(raw, "");
    let text: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let text = RE_SPINNER.replace_all(&text, "");

    let text = RE_THINKING.replace_all(&text, "THINKING…");
    let text = RE_STATUS_PAREN.replace_all(&text, "(STATUS)");
    let text = RE_COUNTER_PAREN.replace_all(&text, "(COUNTERS)");

    let text = RE_PROGRESS_BAR.replace_all(&text, "[PROGRESS]");
    let text = RE_PERCENT.replace_all(&text, "N%");
    let text = RE_SIZE.replace_all(&text, "SIZE");
    let text = RE_CLOCK.replace_all(&text, "HH:MM");

    let text = RE_GIT_BRANCH.replace_all(&text, "git:(BRANCH)");
    let text = RE_BRANCH_GLYPH.replace_all(&text, "⎇ BRANCH");
    let text = RE_TOKEN_COUNTER.replace_all(&text, "N tokens");
    let text = RE_STATUS_COUNTER.replace_all(&text, "N $1");

    let trimmed = text
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    RE_BLANK_RUN.replace_all(&trimmed, "\n\n").into_owned()
}
