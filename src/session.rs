//! The per-login handle that owns the outbox, the credential manager and the
//! background sync task.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::credentials::{
    CredentialError, CredentialManager, CredentialStore, Freshness, MemoryCredentialStore,
    Provider, TokenRefresher,
};
use crate::dispatch::{Dispatcher, Mutation, RemoteWriter, WriteOutcome, WriteThrough};
use crate::events::SyncEvents;
use crate::outbox::{AlwaysOnline, Connectivity, Enqueued, FlushReport, Outbox};
use crate::scheduler::{run_tick, BackgroundSync, NoopPull, ProviderPull, SyncStats};
use crate::storage::{KeyValueStore, MemoryStorage};

/// Host events that should drain the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    ConnectivityRegained,
    AppForeground,
    /// The user pressed retry. Dead-lettered records are revived first.
    ManualRetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    MissingOwner,
    MissingWriter,
    MissingRefresher,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingOwner => write!(f, "session requires a signed-in owner id"),
            SessionError::MissingWriter => write!(f, "session requires a remote writer"),
            SessionError::MissingRefresher => write!(f, "session requires a token refresher"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Collects collaborators for a [`SyncSession`].
pub struct SyncSessionBuilder {
    owner_id: String,
    session_token: String,
    config: SyncConfig,
    writer: Option<Arc<dyn RemoteWriter>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    pull: Option<Arc<dyn ProviderPull>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<SyncEvents>,
}

impl SyncSessionBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn writer(mut self, writer: Arc<dyn RemoteWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn pull(mut self, pull: Arc<dyn ProviderPull>) -> Self {
        self.pull = Some(pull);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn events(mut self, events: SyncEvents) -> Self {
        self.events = Some(events);
        self
    }

    #[cfg(feature = "http")]
    fn default_refresher(config: &SyncConfig) -> Option<Arc<dyn TokenRefresher>> {
        Some(Arc::new(crate::credentials::HttpTokenRefresher::new(
            config.refresh_base_url.clone(),
        )))
    }

    #[cfg(not(feature = "http"))]
    fn default_refresher(_config: &SyncConfig) -> Option<Arc<dyn TokenRefresher>> {
        None
    }

    /// Wire everything up, migrate legacy queued workouts and start the
    /// background task. Must be called inside a tokio runtime.
    ///
    /// Without an explicit refresher, the HTTP refresher pointed at
    /// `config.refresh_base_url` is used when the `http` feature is on.
    pub fn start(self) -> Result<SyncSession, SessionError> {
        if self.owner_id.is_empty() {
            return Err(SessionError::MissingOwner);
        }
        let writer = self.writer.ok_or(SessionError::MissingWriter)?;
        let refresher = match self.refresher {
            Some(refresher) => refresher,
            None => Self::default_refresher(&self.config).ok_or(SessionError::MissingRefresher)?,
        };

        let config = self.config;
        let events = self.events.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let credential_store = self
            .credential_store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let pull = self.pull.unwrap_or_else(|| Arc::new(NoopPull));

        let outbox = Arc::new(
            Outbox::from_config(
                &config,
                storage,
                Dispatcher::new(writer.clone()),
                events.clone(),
            )
            .with_connectivity(
                self.connectivity
                    .unwrap_or_else(|| Arc::new(AlwaysOnline)),
            )
            .with_clock(clock.clone()),
        );

        let credentials = CredentialManager::new(credential_store, refresher, self.session_token)
            .with_clock(clock)
            .with_horizon(config.refresh_horizon())
            .with_events(events.clone());

        outbox.migrate_legacy_failed_workouts(&self.owner_id);

        let background = BackgroundSync::start(
            self.owner_id.clone(),
            config.providers.clone(),
            credentials.clone(),
            pull.clone(),
            config.sync_interval(),
        );

        info!(owner_id = %self.owner_id, "sync session started");
        Ok(SyncSession {
            owner_id: self.owner_id,
            writer: WriteThrough::new(writer, outbox.clone()),
            outbox,
            credentials,
            events,
            providers: config.providers,
            pull,
            background: Some(background),
        })
    }
}

/// Everything sync-related for one signed-in user, from login to logout.
pub struct SyncSession {
    owner_id: String,
    writer: WriteThrough<Arc<dyn RemoteWriter>>,
    outbox: Arc<Outbox>,
    credentials: CredentialManager,
    events: SyncEvents,
    providers: Vec<Provider>,
    pull: Arc<dyn ProviderPull>,
    background: Option<BackgroundSync>,
}

impl SyncSession {
    pub fn builder(owner_id: impl Into<String>, session_token: impl Into<String>) -> SyncSessionBuilder {
        SyncSessionBuilder {
            owner_id: owner_id.into(),
            session_token: session_token.into(),
            config: SyncConfig::default(),
            writer: None,
            credential_store: None,
            refresher: None,
            storage: None,
            pull: None,
            connectivity: None,
            clock: None,
            events: None,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    /// Write now, falling back to the outbox on failure.
    pub async fn write(&self, mutation: Mutation) -> WriteOutcome {
        self.writer.write(&self.owner_id, mutation).await
    }

    pub fn enqueue(&self, kind: &str, payload: Value) -> Option<Enqueued> {
        self.outbox.enqueue(&self.owner_id, kind, payload)
    }

    pub fn pending_count(&self) -> usize {
        self.outbox.pending_count(&self.owner_id)
    }

    pub async fn flush(&self) -> FlushReport {
        self.outbox.flush(&self.owner_id).await
    }

    /// React to a host event by draining the outbox.
    pub async fn on_trigger(&self, trigger: SyncTrigger) -> FlushReport {
        if trigger == SyncTrigger::ManualRetry {
            let revived = self.outbox.retry_dead_letters(&self.owner_id);
            if revived > 0 {
                info!(owner_id = %self.owner_id, revived, "dead-lettered records returned to queue");
            }
        }
        debug!(owner_id = %self.owner_id, ?trigger, "flushing outbox");
        self.flush().await
    }

    pub async fn ensure_fresh_credential(&self, provider: &Provider) -> Result<Freshness, CredentialError> {
        self.credentials.ensure_fresh(&self.owner_id, provider).await
    }

    /// Run one credential check and pull pass now, outside the timer.
    pub async fn sync_now(&self) -> SyncStats {
        run_tick(
            &self.owner_id,
            &self.providers,
            &self.credentials,
            self.pull.as_ref(),
        )
        .await
    }

    /// Stats from the background task so far.
    pub fn background_stats(&self) -> SyncStats {
        self.background
            .as_ref()
            .map(BackgroundSync::stats)
            .unwrap_or_default()
    }

    /// Logout: stop the background task and return its stats. Queued records
    /// stay in storage for the next session.
    pub async fn end(mut self) -> SyncStats {
        let stats = match self.background.take() {
            Some(background) => background.stop().await,
            None => SyncStats::default(),
        };
        info!(owner_id = %self.owner_id, ticks = stats.ticks, "sync session ended");
        stats
    }
}
