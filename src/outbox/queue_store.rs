use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use super::record::{QueueEntry, QueueRecord};
use crate::events::SyncEvents;
use crate::storage::{KeyValueStore, StoreError};

pub const DEFAULT_STORAGE_KEY: &str = "honest_outbox_v1";
pub const DEFAULT_CAPACITY: usize = 200;

/// Persists the outbox as one JSON array under a single storage key.
///
/// Every operation reads or writes the whole sequence. `update` holds an
/// internal guard across its read-modify-write so two callers in the same
/// process cannot interleave.
pub struct QueueStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    events: SyncEvents,
    guard: Mutex<()>,
}

impl QueueStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            key: DEFAULT_STORAGE_KEY.to_string(),
            capacity: DEFAULT_CAPACITY,
            events: SyncEvents::new(),
            guard: Mutex::new(()),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_events(mut self, events: SyncEvents) -> Self {
        self.events = events;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Read every stored entry in order. A missing key is an empty queue; a
    /// value that is not a JSON array is `Corrupt`. Entries that do not decode
    /// as a [`QueueRecord`] are kept as [`QueueEntry::Opaque`].
    pub fn load_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(Vec::new());
        };

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let entries = values
            .into_iter()
            .map(|value| match serde_json::from_value::<QueueRecord>(value.clone()) {
                Ok(record) => QueueEntry::Record(record),
                Err(err) => {
                    warn!(key = %self.key, error = %err, "keeping unreadable outbox entry as-is");
                    QueueEntry::Opaque(value)
                }
            })
            .collect();
        Ok(entries)
    }

    /// The decoded records, in queue order.
    pub fn load(&self) -> Result<Vec<QueueRecord>, StoreError> {
        Ok(self
            .load_entries()?
            .into_iter()
            .filter_map(QueueEntry::into_record)
            .collect())
    }

    /// Like [`load_entries`](Self::load_entries), but any failure reads as an
    /// empty queue.
    pub fn load_entries_or_empty(&self) -> Vec<QueueEntry> {
        self.load_entries().unwrap_or_else(|err| {
            warn!(key = %self.key, error = %err, "outbox load failed; treating as empty");
            Vec::new()
        })
    }

    /// Like [`load`](Self::load), but any failure reads as an empty queue.
    pub fn load_or_empty(&self) -> Vec<QueueRecord> {
        self.load_entries_or_empty()
            .into_iter()
            .filter_map(QueueEntry::into_record)
            .collect()
    }

    /// Write the queue, evicting the oldest entries beyond capacity.
    /// Returns how many were evicted. Subscribers hear about the new length
    /// only after the write succeeds.
    pub fn save(&self, mut entries: Vec<QueueEntry>) -> Result<usize, StoreError> {
        let evicted = entries.len().saturating_sub(self.capacity);
        if evicted > 0 {
            entries.drain(..evicted);
            warn!(evicted, capacity = self.capacity, "outbox full; evicted oldest records");
        }

        let raw =
            serde_json::to_string(&entries).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.storage.set(&self.key, &raw)?;
        self.events.outbox_changed(entries.len());
        Ok(evicted)
    }

    /// Read, modify and write the queue under the store's guard.
    ///
    /// `apply` sees every entry, opaque ones included, so whatever it leaves
    /// in place is written back unchanged. Unreadable stored data is replaced
    /// by whatever `apply` produces from an empty queue. Returns the
    /// closure's output and the eviction count, or `None` for the count when
    /// `apply` reports no change.
    pub fn update<T, F>(&self, apply: F) -> Result<(T, Option<usize>), StoreError>
    where
        F: FnOnce(&mut Vec<QueueEntry>) -> (T, bool),
    {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| StoreError::LockPoisoned("outbox update"))?;

        let mut entries = match self.load_entries() {
            Ok(entries) => entries,
            Err(StoreError::Corrupt(reason)) => {
                warn!(key = %self.key, %reason, "discarding corrupt outbox");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let (output, changed) = apply(&mut entries);
        if !changed {
            return Ok((output, None));
        }

        match self.save(entries) {
            Ok(evicted) => Ok((output, Some(evicted))),
            Err(err) => {
                error!(key = %self.key, error = %err, "outbox save failed");
                Err(err)
            }
        }
    }
}
