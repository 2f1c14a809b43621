// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One execution slice: pre-invoke merge, invoker call, history append,
//! final delivery.
//!
//! A slice runs to completion once started; there is no mid-slice
//! cancellation. Every failure mode is absorbed here so the lane's running
//! slot is always released by the caller, whatever the invoker did.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use parley_core::{CorrectionSource, FailureKind, InvokeOutcome, QueuedMessage};
use parley_history::HistoryEntry;

use crate::SchedulerInner;
use crate::correction::CorrectionWindow;
use crate::typing::TypingPulse;

/// Runs one slice for the lane's popped primary message.
pub(crate) async fn run_slice(inner: Arc<SchedulerInner>, primary: QueuedMessage) {
    let window = CorrectionWindow::new(
        Arc::clone(&inner),
        parley_core::TurnContext::from_message(primary),
    );

    // One merge round immediately before invoking, absorbing follow-ups
    // that landed while the slice was being scheduled.
    let premerged = window.drain();
    if !premerged.is_empty() {
        debug!(merged = premerged.len(), "pre-invoke correction merge");
    }

    let ctx = window.context();
    let key = ctx.conversation_key.as_str().to_string();
    let callback = inner.delivery.get(&ctx.channel).cloned();

    let _typing = callback.as_ref().and_then(|cb| {
        TypingPulse::start(
            Arc::clone(cb),
            ctx.clone(),
            Duration::from_secs(inner.config.typing_interval_secs),
        )
    });

    let outcome = match std::panic::AssertUnwindSafe(inner.invoker.invoke(&ctx, &window))
        .catch_unwind()
        .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(conversation_key = key.as_str(), error = %e, "agent invocation failed");
            InvokeOutcome::failure(FailureKind::Invoker, e.to_string())
        }
        Err(_) => {
            error!(conversation_key = key.as_str(), "agent invocation panicked");
            InvokeOutcome::failure(FailureKind::Internal, "agent invocation panicked")
        }
    };

    // The final context includes every correction folded during the slice.
    let ctx = window.context();

    // A failed execution still produces one terminal history entry, so the
    // persisted conversation never silently desyncs from what the user saw.
    let entry = match &outcome {
        InvokeOutcome::Success { text, .. } => HistoryEntry::assistant(&key, text.clone()),
        InvokeOutcome::Failure { kind, detail } => {
            HistoryEntry::system(&key, format!("agent invocation failed: {detail}"))
                .with_meta(serde_json::json!({ "failure_kind": kind }))
        }
    };
    if let Err(e) = inner.history.append(&entry).await {
        // A lost history write is a correctness problem worth alerting on,
        // but it must not block delivery of the result.
        error!(conversation_key = key.as_str(), error = %e, "failed to persist turn");
    }

    match callback {
        Some(cb) => {
            if let Err(e) = cb.deliver(&ctx, &outcome).await {
                warn!(
                    conversation_key = key.as_str(),
                    channel = ctx.channel.as_str(),
                    error = %e,
                    "final delivery failed"
                );
            }
        }
        None => warn!(
            channel = ctx.channel.as_str(),
            "no delivery callback registered for channel"
        ),
    }

    info!(
        conversation_key = key.as_str(),
        merged = ctx.merged_count,
        success = outcome.is_success(),
        "execution slice complete"
    );
}
