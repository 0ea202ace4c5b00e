use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::pull::ProviderPull;
use crate::credentials::{CredentialManager, Freshness, Provider};

/// Counters from the background sync task.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub ticks: usize,
    pub refreshed: usize,
    pub pulls: usize,
    pub pull_failures: usize,
    pub transient_failures: usize,
    pub disconnected: usize,
    pub not_connected: usize,
    pub errors: usize,
}

/// Shortest period between ticks. Shorter periods are raised to this.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Periodic credential check and provider pull for one signed-in owner.
///
/// The first check runs as soon as the task starts, then once per period.
/// Stopping lets a running check finish before the task exits.
///
/// ```ignore
/// let sync = BackgroundSync::start(
///     "u1",
///     vec![Provider::Fitbit, Provider::Oura],
///     credentials.clone(),
///     Arc::new(NoopPull),
///     Duration::from_secs(30 * 60),
/// );
///
/// // ... on logout
/// let stats = sync.stop().await;
/// ```
pub struct BackgroundSync {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SyncStats>>,
}

impl BackgroundSync {
    /// Spawn the sync task on the current tokio runtime.
    pub fn start(
        owner_id: impl Into<String>,
        providers: Vec<Provider>,
        credentials: CredentialManager,
        pull: Arc<dyn ProviderPull>,
        period: Duration,
    ) -> Self {
        let owner_id = owner_id.into();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(SyncStats::default()));
        let task_stats = stats.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period.max(MIN_PERIOD));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let tick = run_tick(&owner_id, &providers, &credentials, pull.as_ref()).await;
                        if let Ok(mut stats) = task_stats.lock() {
                            stats.merge(&tick);
                        }
                    }
                }
            }
            debug!(%owner_id, "background sync stopped");
        });

        Self {
            stop_tx,
            handle: Some(handle),
            stats,
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> SyncStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) -> SyncStats {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "background sync task ended abnormally");
            }
        }
        self.stats()
    }

    /// Signal the task to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

impl SyncStats {
    fn merge(&mut self, tick: &SyncStats) {
        self.ticks += tick.ticks;
        self.refreshed += tick.refreshed;
        self.pulls += tick.pulls;
        self.pull_failures += tick.pull_failures;
        self.transient_failures += tick.transient_failures;
        self.disconnected += tick.disconnected;
        self.not_connected += tick.not_connected;
        self.errors += tick.errors;
    }
}

/// One pass: check every provider, pull from those with a good credential.
pub(crate) async fn run_tick(
    owner_id: &str,
    providers: &[Provider],
    credentials: &CredentialManager,
    pull: &dyn ProviderPull,
) -> SyncStats {
    let mut stats = SyncStats {
        ticks: 1,
        ..Default::default()
    };
    debug!(owner_id, providers = providers.len(), "background sync tick");

    for provider in providers {
        let freshness = match credentials.ensure_fresh(owner_id, provider).await {
            Ok(freshness) => freshness,
            Err(err) => {
                stats.errors += 1;
                warn!(owner_id, %provider, error = %err, "credential check failed");
                continue;
            }
        };

        match &freshness {
            Freshness::Valid(_) => {}
            Freshness::Refreshed(_) => stats.refreshed += 1,
            Freshness::Stale { .. } => stats.transient_failures += 1,
            Freshness::Disconnected { .. } => stats.disconnected += 1,
            Freshness::NotConnected => stats.not_connected += 1,
        }

        let Some(credential) = freshness.credential().filter(|_| freshness.is_usable()) else {
            continue;
        };

        stats.pulls += 1;
        if let Err(err) = pull.pull(owner_id, credential).await {
            stats.pull_failures += 1;
            warn!(owner_id, %provider, error = %err, "provider pull failed");
        }
    }

    stats
}
