// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The final-delivery seam between the scheduler and platform adapters.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{InvokeOutcome, TurnContext};

/// Delivers the terminal result of an execution slice back to the platform.
///
/// One callback is registered per channel name at scheduler construction.
/// Delivery failures are logged by the scheduler and never retried there;
/// retry, if desired, is the adapter's responsibility on the next user
/// interaction.
#[async_trait]
pub trait DeliveryCallback: Send + Sync {
    /// Delivers the outcome of a slice (success or structured failure).
    async fn deliver(&self, ctx: &TurnContext, outcome: &InvokeOutcome)
    -> Result<(), ParleyError>;

    /// Periodic activity pulse sent while a slice is executing, for channels
    /// with a typing indicator. Default is a no-op.
    async fn typing(&self, _ctx: &TurnContext) -> Result<(), ParleyError> {
        Ok(())
    }
}
