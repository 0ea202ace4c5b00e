//! Fakes for outbox integration tests: a scriptable remote writer and a
//! harness wiring it to in-memory storage and a manual clock.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use honest_sync::{
    Dispatcher, ManualClock, MemoryStorage, Outbox, QueueStore, RemoteError, RemoteWriter,
    WriteOptions,
};
use serde_json::Value;
use tokio::sync::Notify;

pub const T0: i64 = 1_735_689_600_000;

/// One call seen by [`FakeWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub owner_id: String,
    pub payload: Value,
    pub allow_outbox: bool,
}

/// Records calls; fails with a fixed message while `failing` is set.
pub struct FakeWriter {
    failing: AtomicBool,
    message: Mutex<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(false),
            message: Mutex::new("network error".to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_with(&self, message: &str) {
        *self.message.lock().unwrap() = message.to_string();
        self.set_failing(true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn handle(
        &self,
        method: &'static str,
        owner_id: &str,
        payload: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call {
            method,
            owner_id: owner_id.to_string(),
            payload: payload.clone(),
            allow_outbox: options.allow_outbox,
        });
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::transport(self.message.lock().unwrap().clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteWriter for FakeWriter {
    async fn save_workout(&self, owner_id: &str, workout: &Value, options: WriteOptions) -> Result<(), RemoteError> {
        self.handle("save_workout", owner_id, workout, options)
    }

    async fn save_metrics(&self, owner_id: &str, _date: &str, metrics: &Value, options: WriteOptions) -> Result<(), RemoteError> {
        self.handle("save_metrics", owner_id, metrics, options)
    }

    async fn save_meal(&self, owner_id: &str, _date: &str, meal: &Value, options: WriteOptions) -> Result<(), RemoteError> {
        self.handle("save_meal", owner_id, meal, options)
    }

    async fn save_feed_item(&self, owner_id: &str, feed_item: &Value, options: WriteOptions) -> Result<(), RemoteError> {
        self.handle("save_feed_item", owner_id, feed_item, options)
    }
}

/// A writer that parks every call until released.
#[derive(Default)]
pub struct GatedWriter {
    pub entered: Notify,
    pub release: Notify,
}

impl GatedWriter {
    async fn gate(&self) -> Result<(), RemoteError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[async_trait]
impl RemoteWriter for GatedWriter {
    async fn save_workout(&self, _: &str, _: &Value, _: WriteOptions) -> Result<(), RemoteError> {
        self.gate().await
    }

    async fn save_metrics(&self, _: &str, _: &str, _: &Value, _: WriteOptions) -> Result<(), RemoteError> {
        self.gate().await
    }

    async fn save_meal(&self, _: &str, _: &str, _: &Value, _: WriteOptions) -> Result<(), RemoteError> {
        self.gate().await
    }

    async fn save_feed_item(&self, _: &str, _: &Value, _: WriteOptions) -> Result<(), RemoteError> {
        self.gate().await
    }
}

pub struct Harness {
    pub storage: MemoryStorage,
    pub writer: Arc<FakeWriter>,
    pub clock: ManualClock,
    pub outbox: Outbox,
}

pub fn harness() -> Harness {
    let storage = MemoryStorage::new();
    let writer = FakeWriter::new();
    let clock = ManualClock::new(T0);
    let outbox = Outbox::new(
        QueueStore::new(Arc::new(storage.clone())),
        Dispatcher::new(writer.clone()),
    )
    .with_clock(Arc::new(clock.clone()));

    Harness {
        storage,
        writer,
        clock,
        outbox,
    }
}
