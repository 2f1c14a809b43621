// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lane bookkeeping: the per-key queues, the runnable FIFO, and the
//! state transitions the scheduling pass is built from.
//!
//! Everything here is synchronous and lock-free by itself; the scheduler
//! owns one `SchedulerState` behind a mutex and is its only mutator.

use std::collections::{HashMap, VecDeque};

use parley_core::QueuedMessage;

/// The per-conversation-key queue plus running state.
///
/// Created lazily on first enqueue for a key, never explicitly destroyed:
/// an empty idle lane is inert and reusable.
#[derive(Debug)]
pub struct Lane {
    pub channel: String,
    pub queue: VecDeque<QueuedMessage>,
    /// At most one execution slice is in flight per lane.
    pub running: bool,
    /// Whether the key currently sits in the runnable FIFO. Keeps a burst of
    /// enqueues from flooding the FIFO with duplicate entries.
    enlisted: bool,
}

impl Lane {
    fn new(channel: String) -> Self {
        Self {
            channel,
            queue: VecDeque::new(),
            running: false,
            enlisted: false,
        }
    }

    /// Queued plus in-flight work for this lane.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.running)
    }
}

/// Result shape returned by `enqueue`, for adapter observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueResult {
    /// This message's position within its own lane, counting the in-flight
    /// item if any.
    pub lane_position: usize,
    /// Total pending work in this lane (queued + in-flight).
    pub lane_pending: usize,
    /// Global pending count across all lanes.
    pub pending_total: usize,
}

/// All mutable scheduler state: the lane map, the runnable-key FIFO, and
/// the global running count. Owned exclusively by the scheduler.
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub lanes: HashMap<String, Lane>,
    pub runnable: VecDeque<String>,
    pub running: usize,
}

impl SchedulerState {
    /// Appends a message to its lane and marks the key runnable if the lane
    /// is idle. Returns the observability shape for the caller.
    pub fn enqueue(&mut self, msg: QueuedMessage) -> EnqueueResult {
        let key = msg.conversation_key.as_str().to_string();
        let lane = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| Lane::new(msg.channel.clone()));
        lane.queue.push_back(msg);

        if !lane.running && !lane.enlisted {
            lane.enlisted = true;
            self.runnable.push_back(key);
        }

        let lane_pending = lane.pending();
        EnqueueResult {
            lane_position: lane_pending,
            lane_pending,
            pending_total: self.pending_total(),
        }
    }

    /// Pops the next startable slice in FIFO order, skipping stale runnable
    /// entries (lane already running, or queue drained by a merge).
    ///
    /// On success the lane is marked running and the global count is
    /// incremented; the returned message is the slice's primary.
    pub fn next_slice(&mut self) -> Option<QueuedMessage> {
        while let Some(key) = self.runnable.pop_front() {
            let Some(lane) = self.lanes.get_mut(&key) else {
                continue;
            };
            lane.enlisted = false;
            if lane.running {
                continue;
            }
            let Some(primary) = lane.queue.pop_front() else {
                continue;
            };
            lane.running = true;
            self.running += 1;
            return Some(primary);
        }
        None
    }

    /// Releases a lane's running slot. If the lane accumulated more work
    /// while executing, the key goes to the back of the runnable FIFO --
    /// this is what produces round-robin fairness rather than starvation.
    pub fn finish_slice(&mut self, key: &str) {
        let Some(lane) = self.lanes.get_mut(key) else {
            return;
        };
        lane.running = false;
        self.running = self.running.saturating_sub(1);
        if !lane.queue.is_empty() && !lane.enlisted {
            lane.enlisted = true;
            self.runnable.push_back(key.to_string());
        }
    }

    /// Drains up to `max` queued follow-ups from a lane for correction-merge.
    pub fn drain_corrections(&mut self, key: &str, max: usize) -> Vec<QueuedMessage> {
        let Some(lane) = self.lanes.get_mut(key) else {
            return Vec::new();
        };
        let take = lane.queue.len().min(max);
        lane.queue.drain(..take).collect()
    }

    pub fn pending_total(&self) -> usize {
        self.lanes.values().map(Lane::pending).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ConversationKey;

    fn msg(key: &str, text: &str) -> QueuedMessage {
        QueuedMessage {
            channel: "test".to_string(),
            conversation_key: ConversationKey::from(key),
            external_chat_id: key.to_string(),
            text: text.to_string(),
            thread_id: None,
            external_message_id: None,
            actor: None,
        }
    }

    #[test]
    fn enqueue_reports_lane_position_and_pending() {
        let mut state = SchedulerState::default();

        let first = state.enqueue(msg("a", "1"));
        assert_eq!(first.lane_position, 1);
        assert_eq!(first.pending_total, 1);

        let second = state.enqueue(msg("a", "2"));
        assert_eq!(second.lane_position, 2);
        assert_eq!(second.pending_total, 2);

        let other = state.enqueue(msg("b", "1"));
        assert_eq!(other.lane_position, 1);
        assert_eq!(other.pending_total, 3);
    }

    #[test]
    fn lane_position_counts_in_flight_item() {
        let mut state = SchedulerState::default();
        state.enqueue(msg("a", "1"));
        let _primary = state.next_slice().expect("startable");

        let result = state.enqueue(msg("a", "2"));
        assert_eq!(result.lane_position, 2, "in-flight primary counted");
        assert_eq!(result.pending_total, 2);
    }

    #[test]
    fn next_slice_serializes_per_key() {
        let mut state = SchedulerState::default();
        state.enqueue(msg("a", "1"));
        state.enqueue(msg("a", "2"));

        let first = state.next_slice().expect("first slice");
        assert_eq!(first.text, "1");
        // Lane is running, key is not runnable: no second slice for "a".
        assert!(state.next_slice().is_none());

        state.finish_slice("a");
        let second = state.next_slice().expect("second slice after finish");
        assert_eq!(second.text, "2");
    }

    #[test]
    fn runnable_fifo_round_robins_distinct_keys() {
        let mut state = SchedulerState::default();
        state.enqueue(msg("a", "a1"));
        state.enqueue(msg("a", "a2"));
        state.enqueue(msg("b", "b1"));

        let s1 = state.next_slice().expect("a1");
        assert_eq!(s1.conversation_key.as_str(), "a");
        state.finish_slice("a"); // a rejoins behind b

        let s2 = state.next_slice().expect("b1");
        assert_eq!(s2.conversation_key.as_str(), "b");
        state.finish_slice("b");

        let s3 = state.next_slice().expect("a2");
        assert_eq!(s3.text, "a2");
    }

    #[test]
    fn duplicate_enqueues_do_not_flood_runnable_fifo() {
        let mut state = SchedulerState::default();
        for i in 0..10 {
            state.enqueue(msg("a", &i.to_string()));
        }
        assert_eq!(state.runnable.len(), 1);
    }

    #[test]
    fn stale_runnable_entry_is_dropped_not_requeued() {
        let mut state = SchedulerState::default();
        state.enqueue(msg("a", "1"));
        // Merge drains the queue before the runnable entry is popped.
        let drained = state.drain_corrections("a", 10);
        assert_eq!(drained.len(), 1);

        assert!(state.next_slice().is_none(), "empty lane entry dropped");
        assert!(state.runnable.is_empty());
    }

    #[test]
    fn drain_corrections_is_bounded() {
        let mut state = SchedulerState::default();
        for i in 0..5 {
            state.enqueue(msg("a", &i.to_string()));
        }
        let _primary = state.next_slice().expect("primary");

        let batch = state.drain_corrections("a", 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].text, "1");
        assert_eq!(state.drain_corrections("a", 3).len(), 1);
        assert!(state.drain_corrections("a", 3).is_empty());
    }

    #[test]
    fn finish_slice_re_enlists_lane_with_backlog() {
        let mut state = SchedulerState::default();
        state.enqueue(msg("a", "1"));
        let _primary = state.next_slice().expect("primary");
        state.enqueue(msg("a", "2"));
        assert!(state.runnable.is_empty(), "running lane not enlisted");

        state.finish_slice("a");
        assert_eq!(state.runnable.len(), 1);
        assert_eq!(state.running, 0);
    }
}
