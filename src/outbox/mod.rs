//! Durable offline write queue.
//!
//! Writes that cannot reach the backend are queued as [`QueueRecord`]s and
//! delivered later by [`Outbox::flush`] through the [`Dispatcher`](crate::Dispatcher),
//! with per-record backoff on failure.

mod backoff;
mod connectivity;
mod engine;
mod legacy;
mod normalize;
mod queue_store;
mod record;

pub use backoff::{BackoffSchedule, DEFAULT_BACKOFF_MS};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use engine::{Enqueued, FlushReport, Outbox};
pub use legacy::LEGACY_WORKOUT_PREFIX;
pub use normalize::{is_uuid_v4, normalize_payload};
pub use queue_store::{QueueStore, DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY};
pub use record::{QueueEntry, QueueRecord, RecordStatus};
