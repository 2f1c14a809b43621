// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery callback capturing everything the scheduler hands back.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use parley_core::{DeliveryCallback, InvokeOutcome, ParleyError, TurnContext};

/// Captures delivered outcomes and typing pulses for assertions.
///
/// `deliver` can be made to fail (`fail_deliveries`) to verify the
/// scheduler's bookkeeping survives delivery errors.
#[derive(Default)]
pub struct MockDelivery {
    delivered: Mutex<Vec<(TurnContext, InvokeOutcome)>>,
    typing_pulses: AtomicUsize,
    fail_deliveries: AtomicBool,
    notify: Notify,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every `(context, outcome)` delivered so far.
    pub fn delivered(&self) -> Vec<(TurnContext, InvokeOutcome)> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn typing_pulses(&self) -> usize {
        self.typing_pulses.load(Ordering::SeqCst)
    }

    /// Make every subsequent `deliver` call return an error.
    pub fn fail_deliveries(&self) {
        self.fail_deliveries.store(true, Ordering::SeqCst);
    }

    /// Waits until at least `n` outcomes have been delivered.
    ///
    /// Counts failed deliveries too: the callback records the outcome
    /// before reporting the injected error.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.delivered_count() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DeliveryCallback for MockDelivery {
    async fn deliver(
        &self,
        ctx: &TurnContext,
        outcome: &InvokeOutcome,
    ) -> Result<(), ParleyError> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((ctx.clone(), outcome.clone()));
        self.notify.notify_waiters();

        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(ParleyError::delivery("induced delivery failure"));
        }
        Ok(())
    }

    async fn typing(&self, _ctx: &TurnContext) -> Result<(), ParleyError> {
        self.typing_pulses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
