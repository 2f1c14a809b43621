// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fair per-conversation lane scheduling for the Parley runtime.
//!
//! The [`LaneScheduler`] serializes work within a conversation key, runs
//! different keys concurrently under a global ceiling, and rotates fairly
//! among keys with pending work. While a slice executes, newly arrived
//! messages for the same lane can be absorbed as corrections instead of
//! queuing a full second turn (see [`correction`]).
//!
//! All lane/queue/running-count mutations are linearized behind a single
//! mutex held only for sub-millisecond bookkeeping, never across an await.
//! Execution slices run as independent tokio tasks on a [`TaskTracker`] so
//! shutdown can drain them.
//!
//! [`TaskTracker`]: tokio_util::task::TaskTracker

mod correction;
pub mod lane;
pub mod shutdown;
mod slice;
pub mod stats;
mod typing;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use parley_config::SchedulerConfig;
use parley_core::{AgentInvoker, DeliveryCallback, QueuedMessage};
use parley_history::HistoryStore;

pub use lane::EnqueueResult;
pub use shutdown::install_signal_handler;
pub use stats::SchedulerStats;

use lane::SchedulerState;

/// Channel-name to delivery-callback registry, injected at construction.
pub type DeliveryRegistry = HashMap<String, Arc<dyn DeliveryCallback>>;

/// The lane scheduler. Cheap to clone-share via its inner `Arc`.
#[derive(Clone)]
pub struct LaneScheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) struct SchedulerInner {
    pub config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    pub history: Arc<HistoryStore>,
    pub invoker: Arc<dyn AgentInvoker>,
    pub delivery: DeliveryRegistry,
    tracker: TaskTracker,
    draining: AtomicBool,
}

impl SchedulerInner {
    /// The single linearization point for all lane state.
    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LaneScheduler {
    /// Creates a scheduler with explicit dependencies: the history store,
    /// the agent invoker, and the per-channel delivery registry. There is
    /// no global lookup; everything the scheduler touches is passed here.
    pub fn new(
        config: SchedulerConfig,
        history: Arc<HistoryStore>,
        invoker: Arc<dyn AgentInvoker>,
        delivery: DeliveryRegistry,
    ) -> Self {
        info!(
            max_concurrent = config.max_concurrent,
            correction_max_rounds = config.correction_max_rounds,
            correction_max_merged_messages = config.correction_max_merged_messages,
            "lane scheduler initialized"
        );
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState::default()),
                history,
                invoker,
                delivery,
                tracker: TaskTracker::new(),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Accepts one inbound message and triggers a scheduling pass.
    ///
    /// Always succeeds; there is no backpressure by design (lanes may grow
    /// unbounded in memory, monitored via [`SchedulerStats::pending_total`]).
    /// An empty conversation key is a programmer error, not a runtime one.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// [`SchedulerStats::pending_total`]: stats::SchedulerStats
    pub fn enqueue(&self, msg: QueuedMessage) -> EnqueueResult {
        assert!(
            !msg.conversation_key.is_empty(),
            "enqueue requires a non-empty conversation key"
        );

        debug!(
            conversation_key = msg.conversation_key.as_str(),
            channel = msg.channel.as_str(),
            "message enqueued"
        );

        let result = self.inner.state().enqueue(msg);
        kick(&self.inner);
        result
    }

    /// Current load snapshot, recomputed from in-memory lane state.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats::collect(&self.inner.state())
    }

    /// Whether any slice is running or any work is pending.
    pub fn is_busy(&self) -> bool {
        self.stats().is_busy()
    }

    /// Stops starting new slices and waits for in-flight slices to finish.
    ///
    /// Messages still queued after the drain stay queued; a restarted
    /// process re-enqueues from the platform backlog (the idempotency guard
    /// suppresses the duplicates it already claimed).
    pub async fn shutdown(&self) {
        self.inner.draining.store(true, Ordering::SeqCst);
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("lane scheduler drained");
    }
}

/// The scheduling pass: starts slices while capacity remains and runnable
/// lanes exist. Called after every enqueue and every slice completion.
fn kick(inner: &Arc<SchedulerInner>) {
    if inner.draining.load(Ordering::SeqCst) {
        return;
    }

    loop {
        let primary = {
            let mut state = inner.state();
            if state.running >= inner.config.max_concurrent {
                None
            } else {
                state.next_slice()
            }
        };
        let Some(primary) = primary else { break };

        let key = primary.conversation_key.as_str().to_string();
        let slice_inner = Arc::clone(inner);
        inner.tracker.spawn(async move {
            // The slice absorbs its own failures; a panic that still leaks
            // through must not leave the lane marked running forever.
            let run = std::panic::AssertUnwindSafe(slice::run_slice(
                Arc::clone(&slice_inner),
                primary,
            ));
            let _ = futures::FutureExt::catch_unwind(run).await;

            slice_inner.state().finish_slice(&key);
            kick(&slice_inner);
        });
    }
}
