use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::backoff::BackoffSchedule;
use super::connectivity::{AlwaysOnline, Connectivity};
use super::normalize::normalize_payload;
use super::queue_store::QueueStore;
use super::record::{QueueEntry, QueueRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::dispatch::{Delivery, DispatchError, Dispatcher};
use crate::events::SyncEvents;
use crate::storage::KeyValueStore;

/// A record accepted by [`Outbox::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub id: String,
    /// Older records dropped to stay within capacity.
    pub evicted: usize,
}

/// Aggregate result of one flush pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Records handed to a handler.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Owned records skipped because their next attempt is in the future.
    pub deferred: usize,
    /// Owned records of a kind this client cannot deliver.
    pub unrecognized: usize,
    /// Failures in this pass that reached the dead-letter threshold.
    pub dead_lettered: usize,
}

enum Outcome {
    Delivered,
    Retry(QueueRecord),
}

/// The offline write queue: enqueue on failure, flush when back online.
///
/// Neither `enqueue` nor `flush` ever returns a storage or delivery error;
/// failures are logged and folded into the returned values.
pub struct Outbox {
    store: QueueStore,
    dispatcher: Dispatcher,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
    backoff: BackoffSchedule,
    dead_letter_after: Option<u32>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl Outbox {
    pub fn new(store: QueueStore, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            dispatcher,
            connectivity: Arc::new(AlwaysOnline),
            clock: Arc::new(SystemClock),
            backoff: BackoffSchedule::default(),
            dead_letter_after: None,
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Build an outbox over `storage` using the queue key, capacity, backoff
    /// table and dead-letter threshold from `config`.
    pub fn from_config(
        config: &SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        dispatcher: Dispatcher,
        events: SyncEvents,
    ) -> Self {
        let store = QueueStore::new(storage)
            .with_key(config.storage_key.clone())
            .with_capacity(config.capacity)
            .with_events(events);

        let outbox = Self::new(store, dispatcher).with_backoff(config.backoff());
        match config.dead_letter_after {
            Some(limit) => outbox.with_dead_letter_after(limit),
            None => outbox,
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stop retrying a record once it has failed `limit` times. The record is
    /// kept and counted as pending until [`retry_dead_letters`](Self::retry_dead_letters).
    pub fn with_dead_letter_after(mut self, limit: u32) -> Self {
        self.dead_letter_after = Some(limit.max(1));
        self
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    /// Queue a write for later delivery.
    ///
    /// Returns `None` when the owner or kind is empty or the queue could not
    /// be persisted. The payload is stamped with a client id first.
    pub fn enqueue(&self, owner_id: &str, kind: &str, payload: Value) -> Option<Enqueued> {
        if owner_id.is_empty() || kind.is_empty() {
            debug!(owner_id, kind, "ignoring outbox enqueue without owner or kind");
            return None;
        }

        let payload = normalize_payload(kind, payload);
        let record = QueueRecord::new(owner_id, kind, payload, self.clock.now_ms());
        let id = record.id.clone();

        match self.store.update(move |entries| {
            entries.push(QueueEntry::Record(record));
            ((), true)
        }) {
            Ok((_, evicted)) => {
                let evicted = evicted.unwrap_or(0);
                debug!(kind, owner_id, evicted, "queued outbox record");
                Some(Enqueued { id, evicted })
            }
            Err(err) => {
                error!(kind, owner_id, error = %err, "could not queue outbox record");
                None
            }
        }
    }

    /// Records for `owner_id`, or every record when `owner_id` is empty.
    /// Dead-lettered records are included.
    pub fn records(&self, owner_id: &str) -> Vec<QueueRecord> {
        self.store
            .load_or_empty()
            .into_iter()
            .filter(|record| owner_id.is_empty() || record.owner_id == owner_id)
            .collect()
    }

    /// Count for a pending-sync badge. Entries this client cannot read still
    /// count when they carry the owner's id.
    pub fn pending_count(&self, owner_id: &str) -> usize {
        self.store
            .load_entries_or_empty()
            .iter()
            .filter(|entry| owner_id.is_empty() || entry.owner_id() == Some(owner_id))
            .count()
    }

    pub fn dead_letter_count(&self, owner_id: &str) -> usize {
        self.records(owner_id)
            .iter()
            .filter(|record| record.is_dead_lettered())
            .count()
    }

    /// Return the owner's dead-lettered records to the live queue, due now.
    pub fn retry_dead_letters(&self, owner_id: &str) -> usize {
        let now = self.clock.now_ms();
        let result = self.store.update(|entries| {
            let mut revived = 0;
            for record in entries
                .iter_mut()
                .filter_map(QueueEntry::record_mut)
                .filter(|record| record.owner_id == owner_id && record.is_dead_lettered())
            {
                record.revive(now);
                revived += 1;
            }
            (revived, revived > 0)
        });

        match result {
            Ok((revived, _)) => revived,
            Err(err) => {
                error!(owner_id, error = %err, "could not revive dead-lettered records");
                0
            }
        }
    }

    /// Attempt every due record owned by `owner_id`, in queue order.
    ///
    /// Other owners' records, records not yet due, dead letters and unknown
    /// kinds are left untouched. Outcomes are written back in one update at
    /// the end of the pass, merged by id into the current queue so records
    /// enqueued meanwhile survive. Concurrent calls run one after another.
    pub async fn flush(&self, owner_id: &str) -> FlushReport {
        let mut report = FlushReport::default();
        if owner_id.is_empty() || !self.connectivity.is_online() {
            return report;
        }

        let _gate = self.flush_gate.lock().await;
        let now = self.clock.now_ms();

        let mut due = Vec::new();
        for record in self.store.load_or_empty() {
            if record.owner_id != owner_id {
                continue;
            }
            if record.is_due(now) {
                due.push(record);
            } else if !record.is_dead_lettered() {
                report.deferred += 1;
            }
        }

        let mut outcomes = HashMap::new();
        for mut record in due {
            match self
                .dispatcher
                .dispatch(owner_id, &record.kind, &record.payload)
                .await
            {
                Ok(Delivery::Delivered) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                    debug!(kind = %record.kind, id = %record.id, "outbox record delivered");
                    outcomes.insert(record.id.clone(), Outcome::Delivered);
                }
                Ok(Delivery::Unrecognized) => {
                    report.unrecognized += 1;
                    debug!(kind = %record.kind, id = %record.id, "no handler for outbox kind; keeping record");
                }
                Err(err) => {
                    report.attempted += 1;
                    report.failed += 1;
                    self.fail(&mut record, &err, &mut report);
                    outcomes.insert(record.id.clone(), Outcome::Retry(record));
                }
            }
        }

        if outcomes.is_empty() {
            return report;
        }

        let merged = self.store.update(move |entries| {
            let mut changed = false;
            let retained: Vec<QueueEntry> = std::mem::take(entries)
                .into_iter()
                .filter_map(|entry| {
                    let QueueEntry::Record(record) = entry else {
                        return Some(entry);
                    };
                    match outcomes.remove(&record.id) {
                        Some(Outcome::Delivered) => {
                            changed = true;
                            None
                        }
                        Some(Outcome::Retry(updated)) => {
                            changed = true;
                            Some(QueueEntry::Record(updated))
                        }
                        None => Some(QueueEntry::Record(record)),
                    }
                })
                .collect();
            *entries = retained;
            ((), changed)
        });

        if let Err(err) = merged {
            error!(owner_id, error = %err, "could not persist flush results");
        }

        report
    }

    fn fail(&self, record: &mut QueueRecord, err: &DispatchError, report: &mut FlushReport) {
        record.record_failure(err.to_string(), self.clock.now_ms(), &self.backoff);

        let exhausted = self
            .dead_letter_after
            .map_or(false, |limit| record.tries >= limit);
        if exhausted {
            record.dead_letter();
            report.dead_lettered += 1;
            warn!(kind = %record.kind, id = %record.id, tries = record.tries, error = %err, "outbox record dead-lettered");
            return;
        }

        match err {
            DispatchError::MissingField(_) | DispatchError::InvalidPayload(_) => {
                warn!(kind = %record.kind, id = %record.id, tries = record.tries, error = %err, "malformed outbox record; will retry");
            }
            DispatchError::Remote(_) => {
                warn!(kind = %record.kind, tries = record.tries, error = %err, "outbox delivery failed; will retry");
            }
        }
    }
}
