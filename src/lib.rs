//! Offline write outbox and wearable credential lifecycle.
//!
//! A [`SyncSession`] is created at login. It owns one [`Outbox`] that queues
//! writes the backend could not accept and drains them on reconnect, and one
//! [`CredentialManager`] that keeps provider OAuth tokens fresh for the
//! background sync task and for on-demand provider calls.

mod clock;
mod config;
mod credentials;
mod dispatch;
mod events;
mod outbox;
mod scheduler;
mod session;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
#[cfg(feature = "http")]
pub use credentials::HttpTokenRefresher;
pub use credentials::{
    CredentialError, CredentialManager, CredentialRecord, CredentialState, CredentialStore,
    Freshness, MemoryCredentialStore, Provider, RefreshError, RefreshRequest, RefreshedTokens,
    TokenRefresher, BEARER, DEFAULT_REFRESH_HORIZON,
};
pub use dispatch::{
    Delivery, DispatchError, Dispatcher, Mutation, MutationKind, RemoteError, RemoteWriter,
    WriteOptions, WriteOutcome, WriteThrough,
};
pub use events::{ReconnectRequired, SyncEvents, OUTBOX_CHANGED, RECONNECT_REQUIRED};
pub use outbox::{
    is_uuid_v4, normalize_payload, AlwaysOnline, BackoffSchedule, Connectivity, ConnectivityFlag,
    Enqueued, FlushReport, Outbox, QueueEntry, QueueRecord, QueueStore, RecordStatus,
    DEFAULT_BACKOFF_MS, DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY, LEGACY_WORKOUT_PREFIX,
};
pub use scheduler::{BackgroundSync, NoopPull, ProviderPull, PullError, SyncStats};
pub use session::{SessionError, SyncSession, SyncSessionBuilder, SyncTrigger};
pub use storage::{FileStorage, KeyValueStore, MemoryStorage, StoreError};
