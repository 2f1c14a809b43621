// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bounded correction-merge window handed to the agent invoker.

use std::sync::{Arc, Mutex};

use tracing::debug;

use parley_core::{CorrectionSource, QueuedMessage, TurnContext};

use crate::SchedulerInner;

/// Scheduler-side implementation of [`CorrectionSource`] for one slice.
///
/// Holds the authoritative [`TurnContext`] for the turn: every drained
/// batch is folded into it (text in arrival order, identity latest-wins)
/// before being handed to the invoker, so history and delivery observe the
/// fully merged turn even when the invoker incorporates the batch itself.
///
/// Merging is strictly bounded: at most `correction_max_rounds` non-empty
/// batches of at most `correction_max_merged_messages` each. Anything
/// beyond the window stays queued and starts a fresh slice afterward,
/// which is what keeps a chatty lane from starving the others.
pub(crate) struct CorrectionWindow {
    inner: Arc<SchedulerInner>,
    key: String,
    window: Mutex<WindowState>,
}

struct WindowState {
    rounds_used: usize,
    ctx: TurnContext,
}

impl CorrectionWindow {
    pub fn new(inner: Arc<SchedulerInner>, ctx: TurnContext) -> Self {
        let key = ctx.conversation_key.as_str().to_string();
        Self {
            inner,
            key,
            window: Mutex::new(WindowState {
                rounds_used: 0,
                ctx,
            }),
        }
    }

    /// Clone of the merged context as of now.
    pub fn context(&self) -> TurnContext {
        self.lock().ctx.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CorrectionSource for CorrectionWindow {
    fn drain(&self) -> Vec<QueuedMessage> {
        let mut window = self.lock();
        if window.rounds_used >= self.inner.config.correction_max_rounds {
            return Vec::new();
        }

        let batch = self
            .inner
            .state()
            .drain_corrections(&self.key, self.inner.config.correction_max_merged_messages);
        if batch.is_empty() {
            return Vec::new();
        }

        window.rounds_used += 1;
        for msg in &batch {
            window.ctx.fold(msg);
        }
        debug!(
            conversation_key = self.key.as_str(),
            merged = batch.len(),
            round = window.rounds_used,
            "correction batch folded into in-flight slice"
        );
        batch
    }
}
