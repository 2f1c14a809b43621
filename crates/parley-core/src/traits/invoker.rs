// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent-invoker seam consumed by the lane scheduler.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{InvokeOutcome, QueuedMessage, TurnContext};

/// Bounded source of follow-up messages that arrived for the same lane
/// while a slice is executing.
///
/// The scheduler hands an implementation of this to [`AgentInvoker::invoke`].
/// An invoker that can revise its in-progress answer calls [`drain`] between
/// its internal steps; each non-empty batch counts one merge round against
/// the configured bound, after which `drain` returns empty forever. Invokers
/// that cannot revise simply ignore the source -- the batch they would have
/// absorbed starts a fresh slice afterward instead.
///
/// [`drain`]: CorrectionSource::drain
pub trait CorrectionSource: Send + Sync {
    /// Drains one bounded batch of follow-up messages for this turn.
    ///
    /// Returns an empty vec when nothing is queued or the merge window is
    /// exhausted. Drained messages are already folded into the turn context
    /// the scheduler uses for history and delivery.
    fn drain(&self) -> Vec<QueuedMessage>;
}

/// The external agent the scheduler invokes once per execution slice.
///
/// Implementations may be slow (seconds), may stream their own intermediate
/// step notifications out of band, and may fail. The scheduler never retries
/// a failed invocation; the failure is surfaced to the delivery callback and
/// the lane's running slot is released normally.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Runs the agent for one (possibly merged) unit of work.
    ///
    /// `ctx` is a snapshot taken after the pre-invoke merge round; follow-ups
    /// that arrive later are only visible through `corrections`.
    async fn invoke(
        &self,
        ctx: &TurnContext,
        corrections: &dyn CorrectionSource,
    ) -> Result<InvokeOutcome, ParleyError>;
}

/// A correction source that never yields anything.
///
/// Used when invoking outside a scheduler slice (tests, one-shot tools).
pub struct NoCorrections;

impl CorrectionSource for NoCorrections {
    fn drain(&self) -> Vec<QueuedMessage> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_corrections_always_empty() {
        let source = NoCorrections;
        assert!(source.drain().is_empty());
        assert!(source.drain().is_empty());
    }
}
