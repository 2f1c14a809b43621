// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped typing-indicator pulse for in-flight slices.
//!
//! The pulse is a structured background task: started alongside a slice,
//! guaranteed to stop when the slice ends because the returned handle owns
//! a cancellation drop guard. There is no manual `stop()` to forget.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use parley_core::{DeliveryCallback, TurnContext};

/// Handle to a running typing pulse. Dropping it cancels the pulse task.
pub(crate) struct TypingPulse {
    _guard: DropGuard,
}

impl TypingPulse {
    /// Starts a pulse that calls the channel's `typing` hook every
    /// `interval` until the handle is dropped. Returns `None` when the
    /// interval is zero (typing disabled).
    pub fn start(
        callback: Arc<dyn DeliveryCallback>,
        ctx: TurnContext,
        interval: Duration,
    ) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }

        let token = CancellationToken::new();
        let child = token.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = callback.typing(&ctx).await {
                            debug!(
                                channel = ctx.channel.as_str(),
                                error = %e,
                                "typing pulse failed"
                            );
                        }
                    }
                }
            }
        });

        Some(Self {
            _guard: token.drop_guard(),
        })
    }
}
