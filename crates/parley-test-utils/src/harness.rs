// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling the full runtime stack on a temp directory.
//!
//! `SchedulerHarness` wires the idempotency guard, history store, lane
//! scheduler, mock invoker, and mock delivery callback together, and
//! drives the same claim -> append -> enqueue pipeline a platform adapter
//! would.

use std::sync::Arc;

use parley_config::SchedulerConfig;
use parley_core::{ConversationKey, DeliveryCallback, ParleyError, QueuedMessage};
use parley_guard::IdempotencyGuard;
use parley_history::{HistoryEntry, HistoryStore};
use parley_scheduler::{DeliveryRegistry, EnqueueResult, LaneScheduler};

use crate::mock_delivery::MockDelivery;
use crate::mock_invoker::{InvokerMetrics, MockInvoker};

/// The channel name all harness traffic uses.
pub const MOCK_CHANNEL: &str = "mock";

/// Builder for creating test environments with configurable options.
pub struct SchedulerHarnessBuilder {
    config: SchedulerConfig,
    archive_threshold: usize,
    invoker: MockInvoker,
}

impl SchedulerHarnessBuilder {
    fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            archive_threshold: 1000,
            invoker: MockInvoker::new(),
        }
    }

    /// Replace the scheduler configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the history archive threshold.
    pub fn with_archive_threshold(mut self, threshold: usize) -> Self {
        self.archive_threshold = threshold;
        self
    }

    /// Replace the mock invoker (e.g. a gated or failing one).
    pub fn with_invoker(mut self, invoker: MockInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Build the harness, creating all subsystems on a temp directory.
    pub fn build(self) -> SchedulerHarness {
        let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");

        let history = Arc::new(HistoryStore::new(
            temp_dir.path().join("history"),
            self.archive_threshold,
        ));
        let guard = IdempotencyGuard::new(temp_dir.path().join("claims"));
        let delivery = Arc::new(MockDelivery::new());
        let metrics = self.invoker.metrics();

        let mut registry: DeliveryRegistry = DeliveryRegistry::new();
        registry.insert(
            MOCK_CHANNEL.to_string(),
            Arc::clone(&delivery) as Arc<dyn DeliveryCallback>,
        );

        let scheduler = LaneScheduler::new(
            self.config,
            Arc::clone(&history),
            Arc::new(self.invoker),
            registry,
        );

        SchedulerHarness {
            guard,
            history,
            scheduler,
            delivery,
            metrics,
            _temp_dir: temp_dir,
        }
    }
}

/// A complete runtime stack over a temp directory, torn down on drop.
pub struct SchedulerHarness {
    pub guard: IdempotencyGuard,
    pub history: Arc<HistoryStore>,
    pub scheduler: LaneScheduler,
    pub delivery: Arc<MockDelivery>,
    pub metrics: Arc<InvokerMetrics>,
    _temp_dir: tempfile::TempDir,
}

impl SchedulerHarness {
    pub fn builder() -> SchedulerHarnessBuilder {
        SchedulerHarnessBuilder::new()
    }

    /// Drives the full adapter contract for one inbound message: claim it,
    /// persist the user turn, enqueue.
    ///
    /// Returns `None` when the idempotency guard suppressed a duplicate.
    pub async fn send_message(
        &self,
        key: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Option<EnqueueResult>, ParleyError> {
        let outcome = self.guard.claim(MOCK_CHANNEL, key, message_id, None).await;
        if !outcome.claimed {
            return Ok(None);
        }

        self.history
            .append(&HistoryEntry::user(key, text).with_meta(serde_json::json!({
                "message_id": message_id,
            })))
            .await?;

        Ok(Some(self.scheduler.enqueue(self.message(key, text))))
    }

    /// Enqueues directly, bypassing claim and history (scheduler-only tests).
    pub fn enqueue(&self, key: &str, text: &str) -> EnqueueResult {
        self.scheduler.enqueue(self.message(key, text))
    }

    /// Polls until the scheduler reports no running or pending work.
    pub async fn wait_idle(&self) {
        while self.scheduler.is_busy() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    fn message(&self, key: &str, text: &str) -> QueuedMessage {
        QueuedMessage {
            channel: MOCK_CHANNEL.to_string(),
            conversation_key: ConversationKey::from(key),
            external_chat_id: key.to_string(),
            text: text.to_string(),
            thread_id: None,
            external_message_id: None,
            actor: None,
        }
    }
}
