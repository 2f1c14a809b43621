// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim records and the exclusive-create claiming primitive.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// The durable record proving a specific inbound message has begun
/// processing exactly once. Created on first successful claim; never
/// mutated; never deleted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMarker {
    pub channel: String,
    pub conversation_key: String,
    pub message_id: String,
    pub claimed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Why a claim attempt resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClaimReason {
    /// The identity tuple was already claimed (by this or another process).
    AlreadyClaimed,
    /// A required identity field was empty; claimed fail-open.
    MissingKeyFields,
    /// The claim record could not be written; claimed fail-open.
    StorageError,
}

/// Result of a claim attempt.
///
/// `claimed == true` means the caller must proceed with full processing;
/// `claimed == false` means the caller must silently drop the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub claimed: bool,
    pub reason: Option<ClaimReason>,
}

impl ClaimOutcome {
    fn won() -> Self {
        Self {
            claimed: true,
            reason: None,
        }
    }

    fn open(reason: ClaimReason) -> Self {
        Self {
            claimed: true,
            reason: Some(reason),
        }
    }

    fn duplicate() -> Self {
        Self {
            claimed: false,
            reason: Some(ClaimReason::AlreadyClaimed),
        }
    }
}

/// Atomic, filesystem-backed claim-once-per-message guard.
///
/// Claim records live at `<root>/<channel>/<conversation_key>/<message_id>.json`,
/// with each path component sanitized for the filesystem. Creation uses an
/// exclusive-create open so concurrent claimants across processes race on the
/// kernel, not on a check-then-write.
pub struct IdempotencyGuard {
    root: PathBuf,
}

impl IdempotencyGuard {
    /// Creates a guard rooted at the given claims directory.
    ///
    /// The directory is created lazily on first claim; construction never
    /// touches the disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Attempts to claim `(channel, conversation_key, message_id)`.
    ///
    /// The only outcome that suppresses processing is a deterministic
    /// "already exists" on the claim file. Every failure mode claims
    /// fail-open and logs the anomaly.
    pub async fn claim(
        &self,
        channel: &str,
        conversation_key: &str,
        message_id: &str,
        meta: Option<serde_json::Value>,
    ) -> ClaimOutcome {
        if channel.is_empty() || conversation_key.is_empty() || message_id.is_empty() {
            warn!(
                channel,
                conversation_key,
                message_id,
                "claim identity incomplete, failing open"
            );
            return ClaimOutcome::open(ClaimReason::MissingKeyFields);
        }

        let dir = self
            .root
            .join(sanitize(channel))
            .join(sanitize(conversation_key));
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(error = %e, path = %dir.display(), "claim directory not creatable, failing open");
            return ClaimOutcome::open(ClaimReason::StorageError);
        }

        let path = dir.join(format!("{}.json", sanitize(message_id)));
        let marker = ClaimMarker {
            channel: channel.to_string(),
            conversation_key: conversation_key.to_string(),
            message_id: message_id.to_string(),
            claimed_at: Utc::now(),
            meta,
        };

        match self.write_marker(&path, &marker).await {
            Ok(()) => {
                debug!(
                    channel,
                    conversation_key,
                    message_id,
                    "claimed inbound message"
                );
                ClaimOutcome::won()
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(
                    channel,
                    conversation_key,
                    message_id,
                    "duplicate delivery suppressed"
                );
                ClaimOutcome::duplicate()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "claim write failed, failing open");
                ClaimOutcome::open(ClaimReason::StorageError)
            }
        }
    }

    /// Writes the marker with `create_new` so a second writer observes
    /// `AlreadyExists` rather than silently overwriting.
    async fn write_marker(&self, path: &Path, marker: &ClaimMarker) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let body = serde_json::to_vec(marker).map_err(std::io::Error::other)?;
        file.write_all(&body).await?;
        file.flush().await
    }
}

/// Replaces path-hostile bytes in an identity component.
///
/// Alphanumerics, `-`, `_` and `.` pass through; everything else becomes
/// `%XX`. `%` itself is escaped, so distinct inputs map to distinct outputs.
/// The components `.` and `..` are escaped wholesale to keep them from
/// acting as path navigation.
fn sanitize(component: &str) -> String {
    if component == "." || component == ".." {
        return component.bytes().map(|b| format!("%{b:02X}")).collect();
    }
    let mut out = String::with_capacity(component.len());
    for b in component.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
