// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the Parley runtime crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable identifier scoping serialization and history (one per chat/topic).
///
/// Platform adapters choose the key format; the runtime only requires that
/// it is non-empty and stable for the lifetime of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Platform-assigned identifier for an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// One accepted inbound turn awaiting or undergoing execution.
///
/// Created by the platform adapter when it calls `enqueue`; consumed when a
/// slice pops it from its lane, or merged into an executing sibling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Name of the delivery channel this message arrived on.
    pub channel: String,
    pub conversation_key: ConversationKey,
    /// Platform chat identifier used to route the reply.
    pub external_chat_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Execution context for one slice, threaded explicitly from `enqueue`
/// through the agent invoker to the final-delivery callback.
///
/// Correction-merge folds follow-up messages into this context: text is
/// appended in arrival order, identity fields are latest-wins.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub channel: String,
    pub conversation_key: ConversationKey,
    pub external_chat_id: String,
    pub text: String,
    pub thread_id: Option<String>,
    pub external_message_id: Option<String>,
    pub actor: Option<String>,
    /// Number of follow-up messages folded into this turn so far.
    pub merged_count: usize,
}

impl TurnContext {
    /// Builds the context for a slice from its primary message.
    pub fn from_message(msg: QueuedMessage) -> Self {
        Self {
            channel: msg.channel,
            conversation_key: msg.conversation_key,
            external_chat_id: msg.external_chat_id,
            text: msg.text,
            thread_id: msg.thread_id,
            external_message_id: msg.external_message_id,
            actor: msg.actor,
            merged_count: 0,
        }
    }

    /// Folds a correction into the context: appends its text and takes its
    /// identity fields where present (latest wins).
    pub fn fold(&mut self, msg: &QueuedMessage) {
        if !self.text.is_empty() && !msg.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&msg.text);
        if msg.thread_id.is_some() {
            self.thread_id = msg.thread_id.clone();
        }
        if msg.external_message_id.is_some() {
            self.external_message_id = msg.external_message_id.clone();
        }
        if msg.actor.is_some() {
            self.actor = msg.actor.clone();
        }
        self.merged_count += 1;
    }
}

/// Classifies an invoker failure, decided once at the invoker boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The agent itself reported an error.
    Invoker,
    /// The invocation exceeded its allotted time.
    Timeout,
    /// Unexpected runtime fault (panic, poisoned state).
    Internal,
}

/// The terminal result of one execution slice.
///
/// The variant is decided exactly once, at the agent-invoker boundary, and
/// passed downstream unchanged to history persistence and final delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvokeOutcome {
    Success {
        text: String,
        /// Opaque descriptions of side effects the agent performed, for
        /// delivery-layer display. The scheduler never inspects these.
        side_effects: Vec<String>,
    },
    Failure {
        kind: FailureKind,
        detail: String,
    },
}

impl InvokeOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success {
            text: text.into(),
            side_effects: Vec::new(),
        }
    }

    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
