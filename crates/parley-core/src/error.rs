// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley runtime.

use thiserror::Error;

/// The primary error type used across the Parley runtime crates.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors (claim directory not writable, history log I/O, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Scheduler errors (lane bookkeeping violations, shutdown races).
    #[error("scheduler error: {message}")]
    Scheduler { message: String },

    /// Agent invoker errors (the external agent failed or misbehaved).
    #[error("invoker error: {message}")]
    Invoker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Delivery callback errors (platform send failed).
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Wraps an I/O or serialization error as a storage error.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Builds an invoker error from a plain message.
    pub fn invoker(message: impl Into<String>) -> Self {
        Self::Invoker {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a delivery error from a plain message.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            source: None,
        }
    }
}
