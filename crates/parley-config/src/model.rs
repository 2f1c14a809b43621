// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Runtime identity and logging settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Lane scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// On-disk storage settings (claims and history).
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Runtime identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Display name of the runtime instance.
    #[serde(default = "default_runtime_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: default_runtime_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_runtime_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Lane scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Global ceiling on concurrently executing slices.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum correction-merge rounds per slice.
    #[serde(default = "default_correction_max_rounds")]
    pub correction_max_rounds: usize,

    /// Maximum follow-up messages absorbed per merge round.
    #[serde(default = "default_correction_max_merged_messages")]
    pub correction_max_merged_messages: usize,

    /// Seconds between typing pulses while a slice executes. 0 disables.
    #[serde(default = "default_typing_interval_secs")]
    pub typing_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            correction_max_rounds: default_correction_max_rounds(),
            correction_max_merged_messages: default_correction_max_merged_messages(),
            typing_interval_secs: default_typing_interval_secs(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_correction_max_rounds() -> usize {
    2
}

fn default_correction_max_merged_messages() -> usize {
    5
}

fn default_typing_interval_secs() -> u64 {
    5
}

/// On-disk storage configuration.
///
/// `claims/` and `history/` both live beneath `data_dir`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for all persisted runtime state.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Live-log entry count at which history compaction triggers.
    #[serde(default = "default_archive_threshold")]
    pub archive_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_threshold: default_archive_threshold(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("parley").display().to_string())
        .unwrap_or_else(|| ".parley".to_string())
}

fn default_archive_threshold() -> usize {
    1000
}
