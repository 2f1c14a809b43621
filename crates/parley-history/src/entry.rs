// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-turn history record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who produced a turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Runtime-generated entries: failure summaries, compaction markers.
    System,
}

/// One turn in a conversation. Append-only; never mutated after write
/// except by compaction, which relocates (not rewrites) old entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub ts: DateTime<Utc>,
    pub conversation_key: String,
    /// Platform metadata: actor id, external message id, thread id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl HistoryEntry {
    fn new(role: Role, conversation_key: &str, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            ts: Utc::now(),
            conversation_key: conversation_key.to_string(),
            meta: None,
        }
    }

    pub fn user(conversation_key: &str, text: impl Into<String>) -> Self {
        Self::new(Role::User, conversation_key, text)
    }

    pub fn assistant(conversation_key: &str, text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, conversation_key, text)
    }

    pub fn system(conversation_key: &str, text: impl Into<String>) -> Self {
        Self::new(Role::System, conversation_key, text)
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}
