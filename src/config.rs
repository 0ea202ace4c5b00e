use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Provider;
use crate::outbox::{BackoffSchedule, DEFAULT_BACKOFF_MS, DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY};

/// Tunables for the outbox, credential refresh and background sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Storage key holding the serialized queue.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Maximum records kept; oldest are evicted first.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Retry delays in milliseconds, indexed by try count.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Dead-letter a record after this many failed tries. `None` retries forever.
    #[serde(default)]
    pub dead_letter_after: Option<u32>,
    /// Refresh credentials expiring within this many seconds.
    #[serde(default = "default_refresh_horizon_secs")]
    pub refresh_horizon_secs: u64,
    /// Background credential check period in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Base URL of the server-side token refresh endpoints.
    #[serde(default = "default_refresh_base_url")]
    pub refresh_base_url: String,
    /// Providers checked on every background tick.
    #[serde(default = "default_providers")]
    pub providers: Vec<Provider>,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_backoff_ms() -> Vec<u64> {
    DEFAULT_BACKOFF_MS.to_vec()
}

fn default_refresh_horizon_secs() -> u64 {
    15 * 60
}

fn default_sync_interval_secs() -> u64 {
    30 * 60
}

fn default_refresh_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_providers() -> Vec<Provider> {
    vec![Provider::Fitbit, Provider::Oura]
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            capacity: default_capacity(),
            backoff_ms: default_backoff_ms(),
            dead_letter_after: None,
            refresh_horizon_secs: default_refresh_horizon_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            refresh_base_url: default_refresh_base_url(),
            providers: default_providers(),
        }
    }
}

impl SyncConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.backoff_ms.clone())
    }

    pub fn refresh_horizon(&self) -> Duration {
        Duration::from_secs(self.refresh_horizon_secs)
    }

    /// Never shorter than one second.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}
