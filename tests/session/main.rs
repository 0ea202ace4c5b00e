//! Session lifecycle integration tests.


use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use honest_sync::{
    BackgroundSync, ConnectivityFlag, CredentialManager, CredentialStore, FlushReport,
    KeyValueStore, ManualClock, MemoryCredentialStore, MemoryStorage, Mutation, Provider,
    SessionError, SyncConfig, SyncSession, SyncTrigger, WriteOutcome,
};
use serde_json::json;

use support::{builder, fitbit, CountingPull, FixedRefresher, SwitchWriter, HOUR, T0};

const PERIOD: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// Background schedule
// =============================================================================

#[tokio::test(start_paused = true)]
async fn checks_immediately_then_every_period_until_logout() {
    let store = MemoryCredentialStore::new();
    store.save("u1", &fitbit(T0 + 10 * HOUR)).await.unwrap();
    let pull = Arc::new(CountingPull::default());

    let session = builder(
        Arc::new(SwitchWriter::default()),
        FixedRefresher::ok(T0 + 20 * HOUR),
        &store,
        &MemoryStorage::new(),
        &ManualClock::new(T0),
    )
    .pull(pull.clone())
    .start()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(session.background_stats().ticks, 1);
    assert_eq!(pull.pulled(), vec![Provider::Fitbit]);

    tokio::time::sleep(PERIOD).await;
    assert_eq!(session.background_stats().ticks, 2);

    let stats = session.end().await;
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.pulls, 2);

    tokio::time::sleep(PERIOD * 4).await;
    assert_eq!(pull.pulled().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_period_ticks_once_per_second() {
    let store = MemoryCredentialStore::new();
    store.save("u1", &fitbit(T0 + 10 * HOUR)).await.unwrap();
    let credentials = CredentialManager::new(
        Arc::new(store.clone()),
        FixedRefresher::ok(T0 + 20 * HOUR),
        "session-jwt",
    )
    .with_clock(Arc::new(ManualClock::new(T0)));

    let sync = BackgroundSync::start(
        "u1",
        vec![Provider::Fitbit],
        credentials,
        Arc::new(CountingPull::default()),
        Duration::ZERO,
    );

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(sync.stats().ticks, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(sync.stats().ticks, 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(sync.stats().ticks, 2);
    sync.stop().await;
}

#[tokio::test(start_paused = true)]
async fn background_tick_refreshes_expiring_credentials() {
    let store = MemoryCredentialStore::new();
    store.save("u1", &fitbit(T0 + 5 * 60_000)).await.unwrap();
    let refresher = FixedRefresher::ok(T0 + 8 * HOUR);

    let session = builder(
        Arc::new(SwitchWriter::default()),
        refresher.clone(),
        &store,
        &MemoryStorage::new(),
        &ManualClock::new(T0),
    )
    .start()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(refresher.calls(), 1);
    assert_eq!(
        store.get("u1", &Provider::Fitbit).unwrap().access_token,
        "refreshed"
    );
    let stats = session.end().await;
    assert_eq!(stats.refreshed, 1);
}

#[tokio::test]
async fn rejected_refresh_raises_reconnect_prompt() {
    let store = MemoryCredentialStore::new();
    store.save("u1", &fitbit(T0)).await.unwrap();
    let refresher = FixedRefresher::rejecting(401);

    let session = builder(
        Arc::new(SwitchWriter::default()),
        refresher.clone(),
        &store,
        &MemoryStorage::new(),
        &ManualClock::new(T0),
    )
    .config(SyncConfig {
        providers: vec![Provider::Fitbit],
        sync_interval_secs: 24 * 3600,
        ..SyncConfig::default()
    })
    .start()
    .unwrap();

    let (tx, rx) = mpsc::channel();
    session.events().on_reconnect_required(move |signal| {
        let _ = tx.send(signal.provider);
    });

    let freshness = session
        .ensure_fresh_credential(&Provider::Fitbit)
        .await
        .unwrap();
    assert!(freshness.requires_reconnect());

    let stats = session.sync_now().await;
    assert_eq!(stats.disconnected, 1);
    assert_eq!(stats.pulls, 0);
    assert_eq!(refresher.calls(), 1);

    let provider = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(provider, "fitbit");
    session.end().await;
}

// =============================================================================
// Outbox triggers
// =============================================================================

#[tokio::test]
async fn failed_writes_queue_and_drain_on_reconnect() {
    let writer = Arc::new(SwitchWriter::default());
    let flag = ConnectivityFlag::new(false);
    let session = builder(
        writer.clone(),
        FixedRefresher::ok(T0 + HOUR),
        &MemoryCredentialStore::new(),
        &MemoryStorage::new(),
        &ManualClock::new(T0),
    )
    .connectivity(Arc::new(flag.clone()))
    .start()
    .unwrap();

    writer.set_down(true);
    let outcome = session
        .write(Mutation::Workout {
            workout: json!({ "date": "2025-01-01", "exercises": [] }),
        })
        .await;
    assert!(matches!(outcome, WriteOutcome::Queued { .. }));
    assert_eq!(session.pending_count(), 1);

    assert_eq!(
        session.on_trigger(SyncTrigger::AppForeground).await,
        FlushReport::default()
    );

    writer.set_down(false);
    flag.set_online(true);
    let report = session.on_trigger(SyncTrigger::ConnectivityRegained).await;

    assert_eq!((report.attempted, report.succeeded), (1, 1));
    assert_eq!(session.pending_count(), 0);
    assert_eq!(writer.delivered(), 1);
    session.end().await;
}

#[tokio::test]
async fn manual_retry_revives_dead_letters() {
    let writer = Arc::new(SwitchWriter::default());
    let clock = ManualClock::new(T0);
    let session = builder(
        writer.clone(),
        FixedRefresher::ok(T0 + HOUR),
        &MemoryCredentialStore::new(),
        &MemoryStorage::new(),
        &clock,
    )
    .config(SyncConfig {
        providers: vec![],
        dead_letter_after: Some(1),
        ..SyncConfig::default()
    })
    .start()
    .unwrap();

    writer.set_down(true);
    session.enqueue("meal", json!({ "date": "2025-01-01", "meal": { "name": "rice" } }));
    assert_eq!(session.flush().await.dead_lettered, 1);

    writer.set_down(false);
    clock.advance(Duration::from_secs(24 * 3600));
    assert_eq!(
        session.on_trigger(SyncTrigger::AppForeground).await.attempted,
        0
    );

    let report = session.on_trigger(SyncTrigger::ManualRetry).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(session.pending_count(), 0);
    session.end().await;
}

#[tokio::test]
async fn legacy_workouts_are_migrated_at_login() {
    let storage = MemoryStorage::new();
    storage
        .set("failedWorkout_u1_1700000000000", r#"{"date":"2023-11-14","exercises":[]}"#)
        .unwrap();

    let session = builder(
        Arc::new(SwitchWriter::default()),
        FixedRefresher::ok(T0 + HOUR),
        &MemoryCredentialStore::new(),
        &storage,
        &ManualClock::new(T0),
    )
    .start()
    .unwrap();

    assert_eq!(session.pending_count(), 1);
    assert!(storage
        .get("failedWorkout_u1_1700000000000")
        .unwrap()
        .is_none());
    assert_eq!(session.flush().await.succeeded, 1);
    session.end().await;
}

#[tokio::test]
async fn queued_records_outlive_the_session() {
    let storage = MemoryStorage::new();
    let writer = Arc::new(SwitchWriter::default());
    writer.set_down(true);

    let first = builder(
        writer.clone(),
        FixedRefresher::ok(T0 + HOUR),
        &MemoryCredentialStore::new(),
        &storage,
        &ManualClock::new(T0),
    )
    .start()
    .unwrap();
    first.enqueue("metrics", json!({ "date": "2025-01-01", "metrics": { "steps": 1 } }));
    first.end().await;

    writer.set_down(false);
    let second = builder(
        writer,
        FixedRefresher::ok(T0 + HOUR),
        &MemoryCredentialStore::new(),
        &storage,
        &ManualClock::new(T0),
    )
    .start()
    .unwrap();
    assert_eq!(second.pending_count(), 1);
    assert_eq!(second.flush().await.succeeded, 1);
    second.end().await;
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn writer_is_required() {
    let result = SyncSession::builder("u1", "session-jwt")
        .refresher(FixedRefresher::ok(T0))
        .start();
    assert_eq!(result.err(), Some(SessionError::MissingWriter));
}

#[test]
fn owner_is_required() {
    let result = SyncSession::builder("", "session-jwt")
        .writer(Arc::new(SwitchWriter::default()))
        .refresher(FixedRefresher::ok(T0))
        .start();
    assert_eq!(result.err(), Some(SessionError::MissingOwner));
}
