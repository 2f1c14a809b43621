// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the lane scheduler: serialization, the global
//! ceiling, fairness, correction-merge bounds, and failure lifecycle.

use std::time::Duration;

use parley_config::SchedulerConfig;
use parley_core::{ConversationKey, FailureKind, InvokeOutcome, QueuedMessage};
use parley_history::Role;
use parley_test_utils::{MockInvoker, SchedulerHarness};

fn config(max_concurrent: usize, rounds: usize, merged: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent,
        correction_max_rounds: rounds,
        correction_max_merged_messages: merged,
        typing_interval_secs: 0,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn per_key_executions_never_overlap() {
    let harness = SchedulerHarness::builder()
        .with_config(config(4, 0, 0))
        .with_invoker(MockInvoker::new().with_delay(Duration::from_millis(10)))
        .build();

    for i in 0..20 {
        harness.enqueue("burst", &format!("msg {i}"));
    }
    harness.delivery.wait_for(20).await;
    harness.wait_idle().await;

    assert_eq!(harness.metrics.max_concurrent_for("burst"), 1);
    assert_eq!(harness.metrics.completed(), 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn global_ceiling_never_exceeded() {
    let harness = SchedulerHarness::builder()
        .with_config(config(3, 0, 0))
        .with_invoker(MockInvoker::new().with_delay(Duration::from_millis(30)))
        .build();

    for k in 0..12 {
        harness.enqueue(&format!("key-{k}"), "hello");
    }
    harness.delivery.wait_for(12).await;
    harness.wait_idle().await;

    assert_eq!(harness.metrics.max_concurrent(), 3);
    assert_eq!(harness.metrics.completed(), 12);
}

#[tokio::test(flavor = "multi_thread")]
async fn chatty_lane_does_not_starve_quiet_one() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 0, 0))
        .with_invoker(invoker)
        .build();

    harness.enqueue("a", "a1");
    assert_eq!(probe.wait_started().await, "a");

    // While a1 executes, "a" keeps talking and "b" says one thing.
    harness.enqueue("a", "a2");
    harness.enqueue("a", "a3");
    harness.enqueue("b", "b1");

    // Round-robin: b gets the very next slice even though a enqueued first
    // and more often.
    probe.release(1);
    assert_eq!(probe.wait_started().await, "b");
    probe.release(1);
    assert_eq!(probe.wait_started().await, "a");
    probe.release(1);
    assert_eq!(probe.wait_started().await, "a");
    probe.release(1);

    harness.delivery.wait_for(4).await;
    let keys: Vec<String> = harness
        .delivery
        .delivered()
        .iter()
        .map(|(ctx, _)| ctx.conversation_key.as_str().to_string())
        .collect();
    assert_eq!(keys, ["a", "b", "a", "a"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn correction_merge_is_bounded_and_remainder_runs_fresh() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 2, 2))
        .with_invoker(invoker)
        .build();

    harness.enqueue("c", "m0");
    probe.wait_started().await;

    // correction_max_merged_messages + 5 follow-ups land mid-slice.
    for i in 1..=7 {
        harness.enqueue("c", &format!("f{i}"));
    }
    probe.release(1);
    harness.delivery.wait_for(1).await;

    // At most rounds x per-round messages merged into the running slice.
    let delivered = harness.delivery.delivered();
    let (ctx, outcome) = &delivered[0];
    assert_eq!(ctx.merged_count, 4);
    match outcome {
        InvokeOutcome::Success { text, .. } => {
            assert_eq!(text, "echo: m0\nf1\nf2\nf3\nf4");
        }
        InvokeOutcome::Failure { .. } => panic!("expected success"),
    }

    // The remainder starts a fresh slice; its pre-invoke round absorbs the
    // rest of the queue.
    probe.wait_started().await;
    probe.release(1);
    harness.delivery.wait_for(2).await;
    harness.wait_idle().await;

    let delivered = harness.delivery.delivered();
    let (ctx, outcome) = &delivered[1];
    assert_eq!(ctx.merged_count, 2);
    match outcome {
        InvokeOutcome::Success { text, .. } => assert_eq!(text, "echo: f5\nf6\nf7"),
        InvokeOutcome::Failure { .. } => panic!("expected success"),
    }
    assert_eq!(harness.metrics.completed(), 2, "8 messages, 2 slices");
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_follow_up_merges_instead_of_queuing_second_turn() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 2, 5))
        .with_invoker(invoker)
        .build();

    let first = harness.enqueue("c1", "hi");
    assert_eq!(first.pending_total, 1);
    probe.wait_started().await;

    let second = harness.enqueue("c1", "also this");
    assert_eq!(second.pending_total, 2);

    probe.release(1);
    harness.delivery.wait_for(1).await;
    harness.wait_idle().await;

    let delivered = harness.delivery.delivered();
    assert_eq!(delivered.len(), 1, "follow-up merged, not a second turn");
    let (ctx, outcome) = &delivered[0];
    assert_eq!(ctx.merged_count, 1);
    match outcome {
        InvokeOutcome::Success { text, .. } => assert_eq!(text, "echo: hi\nalso this"),
        InvokeOutcome::Failure { .. } => panic!("expected success"),
    }
    assert_eq!(harness.scheduler.stats().pending_total, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_folds_identity_latest_wins() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 2, 5))
        .with_invoker(invoker)
        .build();

    let mut primary = message("c2", "question");
    primary.thread_id = Some("t-1".to_string());
    primary.actor = Some("alice".to_string());
    harness.scheduler.enqueue(primary);
    probe.wait_started().await;

    let mut follow_up = message("c2", "actually, this");
    follow_up.thread_id = Some("t-2".to_string());
    harness.scheduler.enqueue(follow_up);

    probe.release(1);
    harness.delivery.wait_for(1).await;

    let delivered = harness.delivery.delivered();
    let (ctx, _) = &delivered[0];
    assert_eq!(ctx.thread_id.as_deref(), Some("t-2"), "latest thread wins");
    assert_eq!(ctx.actor.as_deref(), Some("alice"), "absent fields keep prior");
}

#[tokio::test(flavor = "multi_thread")]
async fn invoker_failure_releases_slot_and_leaves_terminal_entry() {
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 0, 0))
        .with_invoker(MockInvoker::new().failing_on("boom"))
        .build();

    harness.enqueue("f1", "boom");
    harness.enqueue("f1", "all good");
    harness.delivery.wait_for(2).await;
    harness.wait_idle().await;

    let delivered = harness.delivery.delivered();
    match &delivered[0].1 {
        InvokeOutcome::Failure { kind, detail } => {
            assert_eq!(*kind, FailureKind::Invoker);
            assert!(detail.contains("boom"));
        }
        InvokeOutcome::Success { .. } => panic!("first slice should fail"),
    }
    assert!(delivered[1].1.is_success(), "queued work continues after failure");

    // One terminal history entry summarizes the failure.
    let entries = harness.history.load_recent("f1", 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].role, Role::System);
    assert!(entries[0].text.starts_with("agent invocation failed"));
    assert_eq!(entries[1].role, Role::Assistant);
}

#[tokio::test(flavor = "multi_thread")]
async fn delivery_failure_does_not_corrupt_bookkeeping() {
    let harness = SchedulerHarness::builder()
        .with_config(config(2, 0, 0))
        .build();
    harness.delivery.fail_deliveries();

    harness.enqueue("d1", "one");
    harness.enqueue("d2", "two");
    harness.delivery.wait_for(2).await;
    harness.wait_idle().await;

    assert_eq!(harness.metrics.completed(), 2);
    let stats = harness.scheduler.stats();
    assert_eq!(stats.pending_total, 0);
    assert_eq!(stats.running_total, 0);
    assert!(!harness.scheduler.is_busy());
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_channel_still_executes_and_persists() {
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 0, 0))
        .build();

    let mut msg = message("ghost-key", "hello?");
    msg.channel = "ghost".to_string();
    harness.scheduler.enqueue(msg);
    harness.wait_idle().await;

    assert_eq!(harness.metrics.completed(), 1);
    assert_eq!(harness.delivery.delivered_count(), 0);
    let entries = harness.history.load_recent("ghost-key", 10).await.unwrap();
    assert_eq!(entries.len(), 1, "assistant turn persisted without delivery");
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_reflect_lanes_running_and_channel_breakdown() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(config(1, 0, 0))
        .with_invoker(invoker)
        .build();

    harness.enqueue("s1", "first");
    probe.wait_started().await;
    harness.enqueue("s1", "second");
    harness.enqueue("s2", "third");

    let stats = harness.scheduler.stats();
    assert_eq!(stats.lanes, 2);
    assert_eq!(stats.running_total, 1);
    assert_eq!(stats.pending_total, 3);
    assert_eq!(stats.pending_by_channel.get("mock"), Some(&3));
    assert!(stats.is_busy());

    probe.release(3);
    probe.wait_started().await;
    probe.wait_started().await;
    harness.delivery.wait_for(3).await;
    harness.wait_idle().await;

    let stats = harness.scheduler.stats();
    assert_eq!(stats.pending_total, 0);
    assert_eq!(stats.running_total, 0);
    assert!(stats.pending_by_channel.is_empty());
    assert!(!harness.scheduler.is_busy());
}

#[tokio::test(flavor = "multi_thread")]
async fn typing_pulse_runs_during_slice_and_stops_after() {
    let (invoker, mut probe) = MockInvoker::gated();
    let harness = SchedulerHarness::builder()
        .with_config(SchedulerConfig {
            max_concurrent: 1,
            correction_max_rounds: 0,
            correction_max_merged_messages: 0,
            typing_interval_secs: 1,
        })
        .with_invoker(invoker)
        .build();

    harness.enqueue("t1", "typing test");
    probe.wait_started().await;
    // The interval's first tick fires immediately.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.delivery.typing_pulses() >= 1);

    probe.release(1);
    harness.delivery.wait_for(1).await;
    harness.wait_idle().await;

    let after_slice = harness.delivery.typing_pulses();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(
        harness.delivery.typing_pulses(),
        after_slice,
        "pulse cancelled with the slice"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_in_flight_slices() {
    let harness = SchedulerHarness::builder()
        .with_config(config(4, 0, 0))
        .with_invoker(MockInvoker::new().with_delay(Duration::from_millis(100)))
        .build();

    harness.enqueue("k1", "one");
    harness.enqueue("k2", "two");
    harness.enqueue("k3", "three");
    harness.scheduler.shutdown().await;

    assert_eq!(harness.delivery.delivered_count(), 3, "in-flight work finished");

    // After shutdown, new work queues but no slice starts.
    harness.enqueue("k4", "late");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.metrics.completed(), 3);
    assert_eq!(harness.scheduler.stats().pending_total, 1);
}

fn message(key: &str, text: &str) -> QueuedMessage {
    QueuedMessage {
        channel: parley_test_utils::MOCK_CHANNEL.to_string(),
        conversation_key: ConversationKey::from(key),
        external_chat_id: key.to_string(),
        text: text.to_string(),
        thread_id: None,
        external_message_id: None,
        actor: None,
    }
}
