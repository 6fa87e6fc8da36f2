use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tmux::{CacheGeneration, METADATA_TMUX_SESSION};

/// A dashboard session: one agent working in one checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identity, used as the key of poll results
    pub id: String,
    /// Display name
    pub title: String,
    /// Working copy path
    #[serde(default)]
    pub path: String,
    /// Free-form metadata; `tmux_session` pins the tmux session name
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(id: impl Into<String>, title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: path.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_tmux_session(mut self, name: impl Into<String>) -> Self {
        self.metadata
            .insert(METADATA_TMUX_SESSION.to_string(), name.into());
        self
    }

    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

/// Lowercase, non-alphanumerics folded into single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// One session per tmux session in the cache, for running without a
/// configured session list
pub fn sessions_from_cache(generation: &CacheGeneration) -> Vec<Session> {
    generation
        .session_names()
        .into_iter()
        .map(|name| {
            let path = generation
                .session(&name)
                .and_then(|set| set.iter().next())
                .map(|w| w.info().work_dir.clone())
                .unwrap_or_default();
            Session::new(name.clone(), name.clone(), path).with_tmux_session(name)
        })
        .collect()
}
