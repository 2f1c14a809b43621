// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derived scheduler introspection. Recomputed on demand from in-memory
//! lane state, never persisted.

use std::collections::HashMap;

use crate::lane::SchedulerState;

/// Snapshot of scheduler load for adapters and operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of lanes that have ever had activity (idle empty lanes included).
    pub lanes: usize,
    /// Queued plus in-flight work across all lanes.
    pub pending_total: usize,
    /// Lanes currently executing a slice.
    pub running_total: usize,
    /// Pending work broken down by delivery channel.
    pub pending_by_channel: HashMap<String, usize>,
}

impl SchedulerStats {
    pub(crate) fn collect(state: &SchedulerState) -> Self {
        let mut pending_by_channel: HashMap<String, usize> = HashMap::new();
        let mut pending_total = 0;
        let mut running_total = 0;

        for lane in state.lanes.values() {
            let pending = lane.pending();
            pending_total += pending;
            if lane.running {
                running_total += 1;
            }
            if pending > 0 {
                *pending_by_channel.entry(lane.channel.clone()).or_default() += pending;
            }
        }

        Self {
            lanes: state.lanes.len(),
            pending_total,
            running_total,
            pending_by_channel,
        }
    }

    /// Whether the scheduler has any work in flight or waiting.
    pub fn is_busy(&self) -> bool {
        self.running_total > 0 || self.pending_total > 0
    }
}
