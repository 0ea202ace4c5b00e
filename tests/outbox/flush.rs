use std::sync::Arc;
use std::time::Duration;

use honest_sync::{
    Clock, Dispatcher, FlushReport, MemoryStorage, Outbox, QueueStore, DEFAULT_BACKOFF_MS,
};
use serde_json::json;
use tracing_test::traced_test;

use crate::support::{harness, GatedWriter, T0};

fn workout(date: &str) -> serde_json::Value {
    json!({ "workout": { "date": date, "exercises": [] } })
}

// =============================================================================
// Draining
// =============================================================================

#[tokio::test]
async fn enqueue_then_flush_drains_everything() {
    let h = harness();
    for day in 1..=5 {
        h.outbox
            .enqueue("u1", "workout", workout(&format!("2025-01-0{}", day)))
            .unwrap();
    }
    assert_eq!(h.outbox.pending_count("u1"), 5);

    let report = h.outbox.flush("u1").await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 5);
    assert_eq!(h.outbox.pending_count("u1"), 0);
}

#[tokio::test]
async fn records_are_delivered_in_queue_order() {
    let h = harness();
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));
    h.outbox
        .enqueue("u1", "metrics", json!({ "date": "2025-01-01", "metrics": { "steps": 9 } }));
    h.outbox
        .enqueue("u1", "meal", json!({ "date": "2025-01-01", "meal": { "name": "oats" } }));
    h.outbox
        .enqueue("u1", "feed_item", json!({ "feedItem": { "text": "done" } }));

    h.outbox.flush("u1").await;

    let methods: Vec<_> = h.writer.calls().iter().map(|call| call.method).collect();
    assert_eq!(
        methods,
        vec!["save_workout", "save_metrics", "save_meal", "save_feed_item"]
    );
}

#[tokio::test]
async fn handlers_never_fall_back_to_the_outbox() {
    let h = harness();
    h.writer.set_failing(true);
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));

    h.outbox.flush("u1").await;

    assert!(h.writer.calls().iter().all(|call| !call.allow_outbox));
    assert_eq!(h.outbox.pending_count("u1"), 1);
}

// =============================================================================
// Backoff and due-time gating
// =============================================================================

#[tokio::test]
async fn backoff_is_monotonic_and_clamped() {
    let h = harness();
    h.writer.set_failing(true);
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));

    let mut previous_delay = 0;
    for attempt in 1..=9u32 {
        let now = h.clock.now_ms();
        let report = h.outbox.flush("u1").await;
        assert_eq!(report.attempted, 1, "attempt {}", attempt);

        let record = h.outbox.records("u1").remove(0);
        assert_eq!(record.tries, attempt);
        assert!(record.next_attempt_at > now);

        let delay = record.next_attempt_at - now;
        assert!(delay >= previous_delay);
        let expected = DEFAULT_BACKOFF_MS[(attempt as usize).min(DEFAULT_BACKOFF_MS.len() - 1)];
        assert_eq!(delay as u64, expected);
        previous_delay = delay;

        h.clock.set(record.next_attempt_at);
    }
}

#[tokio::test]
async fn records_not_yet_due_are_skipped() {
    let h = harness();
    h.writer.set_failing(true);
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));
    h.outbox.flush("u1").await;
    assert_eq!(h.writer.call_count(), 1);

    h.clock.advance(Duration::from_millis(14_999));
    let report = h.outbox.flush("u1").await;

    assert_eq!(report.attempted, 0);
    assert_eq!(report.deferred, 1);
    assert_eq!(h.writer.call_count(), 1);

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(h.outbox.flush("u1").await.attempted, 1);
}

#[tokio::test]
async fn first_failure_waits_fifteen_seconds() {
    let h = harness();
    h.writer.set_failing(true);
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));

    h.outbox.flush("u1").await;

    let record = h.outbox.records("u1").remove(0);
    assert_eq!(record.tries, 1);
    assert_eq!(record.next_attempt_at, T0 + 15_000);

    h.clock.advance(Duration::from_millis(15_000));
    h.outbox.flush("u1").await;
    let record = h.outbox.records("u1").remove(0);
    assert_eq!(record.tries, 2);
    assert_eq!(record.next_attempt_at, T0 + 15_000 + 45_000);
}

// =============================================================================
// Isolation and forward compatibility
// =============================================================================

#[tokio::test]
async fn flushing_one_owner_leaves_others_untouched() {
    let h = harness();
    h.outbox.enqueue("u2", "workout", workout("2025-01-01"));
    h.outbox.enqueue("u1", "workout", workout("2025-01-02"));
    let before = h.outbox.records("u2");

    let report = h.outbox.flush("u1").await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(h.outbox.records("u2"), before);
    assert!(h.writer.calls().iter().all(|call| call.owner_id == "u1"));
}

#[tokio::test]
async fn unknown_kinds_are_kept_and_never_attempted() {
    let h = harness();
    let payload = json!({ "hours": 7.5, "stages": ["rem", "deep"] });
    h.outbox.enqueue("u1", "sleep_v2", payload.clone());

    for _ in 0..3 {
        let report = h.outbox.flush("u1").await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.unrecognized, 1);
        h.clock.advance(Duration::from_secs(3600));
    }

    let records = h.outbox.records("u1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, payload);
    assert_eq!(records[0].tries, 0);
    assert_eq!(h.writer.call_count(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn workout_scenario_succeeds_then_retries_three_times() {
    let h = harness();
    let payload = json!({ "date": "2025-01-01", "exercises": [] });

    h.outbox.enqueue("u1", "workout", payload.clone());
    let report = h.outbox.flush("u1").await;
    assert_eq!((report.attempted, report.succeeded), (1, 1));
    assert_eq!(h.outbox.pending_count("u1"), 0);

    h.writer.fail_with("network error");
    h.outbox.enqueue("u1", "workout", payload);
    for _ in 0..3 {
        let report = h.outbox.flush("u1").await;
        assert_eq!((report.attempted, report.failed), (1, 1));
        let due = h.outbox.records("u1")[0].next_attempt_at;
        h.clock.set(due);
    }

    let records = h.outbox.records("u1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tries, 3);
    assert_eq!(records[0].last_error.as_deref(), Some("network error"));
}

#[tokio::test]
#[traced_test]
async fn malformed_records_are_retried_and_reported() {
    let h = harness();
    h.outbox
        .enqueue("u1", "metrics", json!({ "metrics": { "steps": 10 } }))
        .unwrap();

    let report = h.outbox.flush("u1").await;

    assert_eq!(report.failed, 1);
    assert_eq!(h.writer.call_count(), 0);
    let record = &h.outbox.records("u1")[0];
    assert_eq!(record.tries, 1);
    assert_eq!(record.last_error.as_deref(), Some("payload is missing date"));
    assert!(logs_contain("malformed outbox record"));
}

#[tokio::test]
async fn dead_letter_threshold_parks_records() {
    let storage = MemoryStorage::new();
    let h = harness();
    h.writer.set_failing(true);
    let outbox = Outbox::new(
        QueueStore::new(Arc::new(storage)),
        Dispatcher::new(h.writer.clone()),
    )
    .with_clock(Arc::new(h.clock.clone()))
    .with_dead_letter_after(3);
    outbox.enqueue("u1", "workout", workout("2025-01-01"));

    let mut parked = 0;
    for _ in 0..3 {
        parked += outbox.flush("u1").await.dead_lettered;
        h.clock.advance(Duration::from_secs(3600));
    }

    assert_eq!(parked, 1);
    assert_eq!(outbox.dead_letter_count("u1"), 1);
    assert_eq!(outbox.pending_count("u1"), 1);
    assert_eq!(outbox.flush("u1").await, FlushReport::default());
    assert_eq!(h.writer.call_count(), 3);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn records_enqueued_during_a_flush_survive() {
    let storage = MemoryStorage::new();
    let writer = Arc::new(GatedWriter::default());
    let outbox = Arc::new(Outbox::new(
        QueueStore::new(Arc::new(storage)),
        Dispatcher::new(writer.clone()),
    ));
    let first = outbox.enqueue("u1", "workout", workout("2025-01-01")).unwrap();

    let flushing = {
        let outbox = outbox.clone();
        tokio::spawn(async move { outbox.flush("u1").await })
    };
    writer.entered.notified().await;

    let second = outbox.enqueue("u1", "workout", workout("2025-01-02")).unwrap();
    writer.release.notify_one();
    let report = flushing.await.unwrap();

    assert_eq!(report.succeeded, 1);
    let remaining: Vec<_> = outbox.records("u1").into_iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![second.id]);
    assert_ne!(remaining[0], first.id);
}

#[tokio::test]
async fn created_at_uses_the_injected_clock() {
    let h = harness();
    h.outbox.enqueue("u1", "workout", workout("2025-01-01"));
    let record = &h.outbox.records("u1")[0];
    assert_eq!(record.created_at, T0);
    assert_eq!(record.next_attempt_at, T0);
}
