// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversational-agent runtime.
//!
//! This crate provides the foundational trait seams, error type, and common
//! types used throughout the Parley workspace: the conversation/message
//! identity types, the [`TurnContext`] threaded through every execution
//! slice, the tagged [`InvokeOutcome`], and the [`AgentInvoker`] /
//! [`DeliveryCallback`] boundaries the scheduler consumes.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use traits::{AgentInvoker, CorrectionSource, DeliveryCallback};
pub use types::{
    ConversationKey, FailureKind, InvokeOutcome, MessageId, QueuedMessage, TurnContext,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_has_all_variants() {
        let _config = ParleyError::Config("test".into());
        let _storage = ParleyError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _scheduler = ParleyError::Scheduler {
            message: "test".into(),
        };
        let _invoker = ParleyError::Invoker {
            message: "test".into(),
            source: None,
        };
        let _delivery = ParleyError::Delivery {
            message: "test".into(),
            source: None,
        };
        let _internal = ParleyError::Internal("test".into());
    }

    #[test]
    fn conversation_key_display_and_emptiness() {
        let key = ConversationKey::from("telegram:42");
        assert_eq!(key.to_string(), "telegram:42");
        assert!(!key.is_empty());
        assert!(ConversationKey::from("").is_empty());
    }

    #[test]
    fn trait_objects_are_constructible() {
        // Compile-time check that the seams are object-safe.
        fn _assert_invoker(_: &dyn AgentInvoker) {}
        fn _assert_delivery(_: &dyn DeliveryCallback) {}
        fn _assert_corrections(_: &dyn CorrectionSource) {}
    }
}
