// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering over full conversation history (live log + archives).

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::entry::{HistoryEntry, Role};

/// A search over one conversation's full history.
///
/// Filters apply in order: time range, role, keyword, then truncation to
/// the `limit` most recent matches. The keyword is tried as a regular
/// expression first; an invalid pattern falls back to case-insensitive
/// substring matching.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub role: Option<Role>,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            start_time: None,
            end_time: None,
            role: None,
            limit: 50,
        }
    }
}

impl SearchQuery {
    /// Applies the filters to entries ordered oldest-first, returning the
    /// `limit` most recent matches, still oldest-first.
    pub fn apply(&self, entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
        let matcher = self.keyword.as_deref().map(KeywordMatcher::new);

        let mut matches: Vec<HistoryEntry> = entries
            .into_iter()
            .filter(|e| {
                if let Some(start) = self.start_time
                    && e.ts < start
                {
                    return false;
                }
                if let Some(end) = self.end_time
                    && e.ts > end
                {
                    return false;
                }
                if let Some(role) = self.role
                    && e.role != role
                {
                    return false;
                }
                if let Some(ref m) = matcher
                    && !m.matches(&e.text)
                {
                    return false;
                }
                true
            })
            .collect();

        if matches.len() > self.limit {
            matches.split_off(matches.len() - self.limit)
        } else {
            matches
        }
    }
}

enum KeywordMatcher {
    Pattern(Regex),
    Substring(String),
}

impl KeywordMatcher {
    fn new(keyword: &str) -> Self {
        match Regex::new(keyword) {
            Ok(re) => Self::Pattern(re),
            Err(e) => {
                debug!(keyword, error = %e, "invalid search pattern, using substring match");
                Self::Substring(keyword.to_lowercase())
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(text),
            Self::Substring(needle) => text.to_lowercase().contains(needle),
        }
    }
}
