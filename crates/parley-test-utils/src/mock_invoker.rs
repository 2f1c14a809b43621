// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock agent invoker for deterministic scheduler testing.
//!
//! `MockInvoker` echoes the (possibly correction-merged) turn text back as
//! its answer, with hooks for gating, delays, failure injection, and
//! concurrency observation, enabling fast, CI-runnable tests with no real
//! agent behind them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use parley_core::{AgentInvoker, CorrectionSource, InvokeOutcome, ParleyError, TurnContext};

/// Observed concurrency, shared between the invoker and the test body.
#[derive(Default)]
pub struct InvokerMetrics {
    current: AtomicUsize,
    max: AtomicUsize,
    per_key: Mutex<HashMap<String, (usize, usize)>>,
    completed: AtomicUsize,
}

impl InvokerMetrics {
    /// Highest number of concurrently running invocations observed.
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Highest per-key concurrency observed for `key`.
    pub fn max_concurrent_for(&self, key: &str) -> usize {
        self.per_key
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map_or(0, |(_, max)| *max)
    }

    /// Total invocations that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn enter(&self, key: &str) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        let mut per_key = self.per_key.lock().unwrap_or_else(|e| e.into_inner());
        let slot = per_key.entry(key.to_string()).or_insert((0, 0));
        slot.0 += 1;
        slot.1 = slot.1.max(slot.0);
    }

    fn exit(&self, key: &str) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        let mut per_key = self.per_key.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = per_key.get_mut(key) {
            slot.0 -= 1;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test-side handle for a gated [`MockInvoker`].
pub struct InvokerProbe {
    started: mpsc::UnboundedReceiver<String>,
    gate: Arc<Semaphore>,
}

impl InvokerProbe {
    /// Waits until the next invocation has started, returning its key.
    pub async fn wait_started(&mut self) -> String {
        self.started
            .recv()
            .await
            .expect("mock invoker dropped before test finished")
    }

    /// Lets `n` blocked invocations proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

/// A mock agent that answers `echo: <merged text>`.
///
/// By default it drains the correction window until the window reports
/// empty, mirroring an agent that revises its in-progress answer.
pub struct MockInvoker {
    metrics: Arc<InvokerMetrics>,
    delay: Option<Duration>,
    fail_marker: Option<String>,
    drain_corrections: bool,
    started_tx: Option<mpsc::UnboundedSender<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInvoker {
    /// Ungated echo invoker.
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(InvokerMetrics::default()),
            delay: None,
            fail_marker: None,
            drain_corrections: true,
            started_tx: None,
            gate: None,
        }
    }

    /// Gated invoker: each invocation reports its start on the probe, then
    /// blocks until the probe releases a permit.
    pub fn gated() -> (Self, InvokerProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let invoker = Self {
            started_tx: Some(tx),
            gate: Some(Arc::clone(&gate)),
            ..Self::new()
        };
        (invoker, InvokerProbe { started: rx, gate })
    }

    /// Sleep this long inside every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail any invocation whose text contains `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Do not drain corrections (an agent that cannot revise mid-flight).
    pub fn without_correction_drain(mut self) -> Self {
        self.drain_corrections = false;
        self
    }

    /// Shared concurrency metrics.
    pub fn metrics(&self) -> Arc<InvokerMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl AgentInvoker for MockInvoker {
    async fn invoke(
        &self,
        ctx: &TurnContext,
        corrections: &dyn CorrectionSource,
    ) -> Result<InvokeOutcome, ParleyError> {
        let key = ctx.conversation_key.as_str().to_string();
        self.metrics.enter(&key);
        let result = self.run(ctx, corrections).await;
        self.metrics.exit(&key);
        result
    }
}

impl MockInvoker {
    async fn run(
        &self,
        ctx: &TurnContext,
        corrections: &dyn CorrectionSource,
    ) -> Result<InvokeOutcome, ParleyError> {
        if let Some(tx) = &self.started_tx {
            let _ = tx.send(ctx.conversation_key.as_str().to_string());
        }
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ParleyError::invoker("gate closed"))?;
            permit.forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut text = ctx.text.clone();
        if self.drain_corrections {
            loop {
                let batch = corrections.drain();
                if batch.is_empty() {
                    break;
                }
                for msg in batch {
                    text.push('\n');
                    text.push_str(&msg.text);
                }
            }
        }

        if let Some(marker) = &self.fail_marker
            && text.contains(marker.as_str())
        {
            return Err(ParleyError::invoker(format!(
                "induced failure on `{marker}`"
            )));
        }

        Ok(InvokeOutcome::success(format!("echo: {text}")))
    }
}
