//! In-process notifications for reactive UI (pending-sync badges, reconnect
//! prompts).
//!
//! Listeners run on the emitter's own threads, so they must not assume they
//! are called synchronously with the change that triggered them.

use std::sync::{Arc, Mutex};

use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credentials::Provider;

/// Emitted after every successful queue write. Payload: the queue length.
pub const OUTBOX_CHANGED: &str = "outbox:changed";

/// Emitted when a provider rejects a refresh. Payload: [`ReconnectRequired`].
pub const RECONNECT_REQUIRED: &str = "credentials:reconnect_required";

/// A provider connection that needs explicit user re-authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectRequired {
    pub owner_id: String,
    pub provider: String,
}

/// Shared notification hub. Clones share listeners.
#[derive(Clone)]
pub struct SyncEvents {
    emitter: Arc<Mutex<EventEmitter>>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        Self {
            emitter: Arc::new(Mutex::new(EventEmitter::new())),
        }
    }

    /// Subscribe to queue changes. The listener receives the new queue length.
    pub fn on_outbox_changed<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.on(OUTBOX_CHANGED, listener);
            }
            Err(_) => warn!("sync event emitter poisoned; listener not registered"),
        }
    }

    /// Subscribe to hard credential failures.
    pub fn on_reconnect_required<F>(&self, listener: F)
    where
        F: Fn(ReconnectRequired) + Send + Sync + 'static,
    {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.on(RECONNECT_REQUIRED, listener);
            }
            Err(_) => warn!("sync event emitter poisoned; listener not registered"),
        }
    }

    pub(crate) fn outbox_changed(&self, queue_len: usize) {
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.emit(OUTBOX_CHANGED, queue_len);
        }
    }

    pub(crate) fn reconnect_required(&self, owner_id: &str, provider: &Provider) {
        let payload = ReconnectRequired {
            owner_id: owner_id.to_string(),
            provider: provider.to_string(),
        };
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.emit(RECONNECT_REQUIRED, payload);
        }
    }
}
