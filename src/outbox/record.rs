use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::backoff::BackoffSchedule;

/// Delivery status of a queued record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    /// Gave up after the configured number of tries. Kept, never flushed.
    DeadLettered,
}

impl RecordStatus {
    pub fn is_pending(&self) -> bool {
        *self == RecordStatus::Pending
    }
}

/// One pending mutation in the outbox.
///
/// Serialized in camelCase so queues written by older clients load unchanged.
/// Fields this version does not know about are kept in `extra` and written
/// back as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: String,
    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: String,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub tries: u32,
    #[serde(default)]
    pub next_attempt_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "RecordStatus::is_pending")]
    pub status: RecordStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueRecord {
    /// A fresh record, due immediately.
    pub fn new(
        owner_id: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
        now_ms: i64,
    ) -> Self {
        let owner_id = owner_id.into();
        let kind = kind.into();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}_{}_{}_{}", kind, owner_id, now_ms, &suffix[..8]);

        Self {
            id,
            owner_id,
            kind,
            payload,
            created_at: now_ms,
            tries: 0,
            next_attempt_at: now_ms,
            last_error: None,
            status: RecordStatus::Pending,
            extra: Map::new(),
        }
    }

    pub fn is_dead_lettered(&self) -> bool {
        self.status == RecordStatus::DeadLettered
    }

    /// Pending and past its next attempt time.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status.is_pending() && self.next_attempt_at <= now_ms
    }

    /// Count one failed attempt and push the next attempt out.
    pub fn record_failure(&mut self, error: impl Into<String>, now_ms: i64, backoff: &BackoffSchedule) {
        self.tries = self.tries.saturating_add(1);
        self.next_attempt_at = backoff.next_attempt_at(now_ms, self.tries);
        self.last_error = Some(error.into());
    }

    pub fn dead_letter(&mut self) {
        self.status = RecordStatus::DeadLettered;
    }

    /// Return a dead-lettered record to the live queue, due now.
    /// `tries` and `last_error` are kept for diagnostics.
    pub fn revive(&mut self, now_ms: i64) {
        self.status = RecordStatus::Pending;
        self.next_attempt_at = now_ms;
    }
}

/// One element of the stored queue array.
///
/// Entries this build cannot decode, such as records written by a newer
/// client, stay `Opaque` and are written back verbatim in their original
/// position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Record(QueueRecord),
    Opaque(Value),
}

impl QueueEntry {
    pub fn record(&self) -> Option<&QueueRecord> {
        match self {
            QueueEntry::Record(record) => Some(record),
            QueueEntry::Opaque(_) => None,
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut QueueRecord> {
        match self {
            QueueEntry::Record(record) => Some(record),
            QueueEntry::Opaque(_) => None,
        }
    }

    pub fn into_record(self) -> Option<QueueRecord> {
        match self {
            QueueEntry::Record(record) => Some(record),
            QueueEntry::Opaque(_) => None,
        }
    }

    /// Owner of the entry. Opaque entries are read from their raw
    /// `userId` (or `ownerId`) field when it is a string.
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            QueueEntry::Record(record) => Some(&record.owner_id),
            QueueEntry::Opaque(raw) => raw
                .get("userId")
                .or_else(|| raw.get("ownerId"))
                .and_then(Value::as_str),
        }
    }
}

impl From<QueueRecord> for QueueEntry {
    fn from(record: QueueRecord) -> Self {
        QueueEntry::Record(record)
    }
}
