// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as minimum thresholds and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !KNOWN_LOG_LEVELS.contains(&config.runtime.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "runtime.log_level `{}` is not one of {}",
                config.runtime.log_level,
                KNOWN_LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.scheduler.max_concurrent == 0 {
        errors.push(ConfigError::Validation {
            message: "scheduler.max_concurrent must be at least 1".to_string(),
        });
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.data_dir must not be empty".to_string(),
        });
    }

    // Compaction splits the live log in half; a threshold below 2 would
    // archive empty prefixes forever.
    if config.storage.archive_threshold < 2 {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.archive_threshold must be at least 2, got {}",
                config.storage.archive_threshold
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
