use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::error::{CredentialError, RefreshError};
use super::record::{CredentialRecord, CredentialState, Provider, DEFAULT_REFRESH_HORIZON};
use super::refresh::{RefreshRequest, TokenRefresher};
use super::store::CredentialStore;
use crate::clock::{Clock, SystemClock};
use crate::events::SyncEvents;

/// Result of [`CredentialManager::ensure_fresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Stored credential is outside the refresh horizon.
    Valid(CredentialRecord),
    /// A refresh succeeded and the new credential was stored.
    Refreshed(CredentialRecord),
    /// A refresh failed transiently. The stored credential is returned
    /// unchanged and may already be expired.
    Stale {
        credential: CredentialRecord,
        reason: String,
    },
    /// The provider rejected the refresh token. The user must reconnect.
    Disconnected { provider: Provider, reason: String },
    /// No credential is stored for this owner and provider.
    NotConnected,
}

impl Freshness {
    /// The credential to call the provider with, if any.
    pub fn credential(&self) -> Option<&CredentialRecord> {
        match self {
            Freshness::Valid(record) | Freshness::Refreshed(record) => Some(record),
            Freshness::Stale { credential, .. } => Some(credential),
            Freshness::Disconnected { .. } | Freshness::NotConnected => None,
        }
    }

    /// Whether the credential is known good for at least the horizon.
    pub fn is_usable(&self) -> bool {
        matches!(self, Freshness::Valid(_) | Freshness::Refreshed(_))
    }

    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Freshness::Disconnected { .. })
    }
}

type Key = (String, Provider);
type InFlight = Shared<BoxFuture<'static, Result<Freshness, CredentialError>>>;

/// Keeps provider access tokens fresh.
///
/// Calls for the same (owner, provider) made while a check is running share
/// that check's result, so at most one refresh exchange is in flight per
/// key. A hard refresh failure marks the key disconnected; further calls
/// report `Disconnected` without contacting the provider until
/// [`connect`](Self::connect) or [`disconnect`](Self::disconnect) is called.
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    horizon: Duration,
    session_token: Arc<RwLock<String>>,
    events: SyncEvents,
    in_flight: Arc<Mutex<HashMap<Key, InFlight>>>,
    disconnected: Arc<Mutex<HashMap<Key, String>>>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refresher,
            clock: Arc::new(SystemClock),
            horizon: DEFAULT_REFRESH_HORIZON,
            session_token: Arc::new(RwLock::new(session_token.into())),
            events: SyncEvents::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            disconnected: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_events(mut self, events: SyncEvents) -> Self {
        self.events = events;
        self
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Replace the session bearer sent to the refresh endpoint.
    pub fn set_session_token(&self, token: impl Into<String>) -> Result<(), CredentialError> {
        let mut current = self
            .session_token
            .write()
            .map_err(|_| CredentialError::LockPoisoned("session token"))?;
        *current = token.into();
        Ok(())
    }

    /// Store the credential from a completed provider connection.
    pub async fn connect(&self, owner_id: &str, record: CredentialRecord) -> Result<(), CredentialError> {
        self.store.save(owner_id, &record).await?;
        self.clear_disconnected(owner_id, &record.provider)?;
        info!(owner_id, provider = %record.provider, "provider connected");
        Ok(())
    }

    /// Forget the provider's credential.
    pub async fn disconnect(&self, owner_id: &str, provider: &Provider) -> Result<(), CredentialError> {
        self.store.delete(owner_id, provider).await?;
        self.clear_disconnected(owner_id, provider)?;
        info!(owner_id, %provider, "provider disconnected");
        Ok(())
    }

    /// Current lifecycle state without refreshing. `None` when nothing is stored.
    pub async fn state(
        &self,
        owner_id: &str,
        provider: &Provider,
    ) -> Result<Option<CredentialState>, CredentialError> {
        if self.disconnected_reason(owner_id, provider)?.is_some() {
            return Ok(Some(CredentialState::Disconnected));
        }
        let record = self.store.load(owner_id, provider).await?;
        let now = self.clock.now_ms();
        Ok(record.map(|record| record.state_at(now, self.horizon)))
    }

    /// Return a usable credential, refreshing it first if it expires within
    /// the horizon.
    pub async fn ensure_fresh(
        &self,
        owner_id: &str,
        provider: &Provider,
    ) -> Result<Freshness, CredentialError> {
        let key = (owner_id.to_string(), provider.clone());
        let check = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| CredentialError::LockPoisoned("in-flight refreshes"))?;

            match in_flight.get(&key) {
                Some(running) => running.clone(),
                None => {
                    let manager = self.clone();
                    let task_key = key.clone();
                    let check = async move {
                        let result = manager.check(&task_key.0, &task_key.1).await;
                        if let Ok(mut in_flight) = manager.in_flight.lock() {
                            in_flight.remove(&task_key);
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, check.clone());
                    check
                }
            }
        };

        check.await
    }

    async fn check(&self, owner_id: &str, provider: &Provider) -> Result<Freshness, CredentialError> {
        if let Some(reason) = self.disconnected_reason(owner_id, provider)? {
            return Ok(Freshness::Disconnected {
                provider: provider.clone(),
                reason,
            });
        }

        let Some(record) = self.store.load(owner_id, provider).await? else {
            return Ok(Freshness::NotConnected);
        };

        if record.state_at(self.clock.now_ms(), self.horizon) == CredentialState::Valid {
            return Ok(Freshness::Valid(record));
        }

        let Some(refresh_token) = record.refresh_token.clone().filter(|token| !token.is_empty())
        else {
            return self.hard_failure(owner_id, provider, "no refresh token stored".to_string());
        };

        let request = RefreshRequest {
            owner_id: owner_id.to_string(),
            provider: provider.clone(),
            refresh_token,
            session_token: self.session_token()?,
        };

        debug!(owner_id, %provider, "refreshing provider credential");
        match self.refresher.refresh(request).await {
            Ok(tokens) => {
                let refreshed = record.refreshed(tokens);
                self.store.save(owner_id, &refreshed).await?;
                info!(owner_id, %provider, expires_at = ?refreshed.expires_at, "provider credential refreshed");
                Ok(Freshness::Refreshed(refreshed))
            }
            Err(err @ RefreshError::Rejected { .. }) => {
                self.hard_failure(owner_id, provider, err.to_string())
            }
            Err(RefreshError::Transient(reason)) => {
                warn!(owner_id, %provider, %reason, "credential refresh failed; will retry on next check");
                Ok(Freshness::Stale {
                    credential: record,
                    reason,
                })
            }
        }
    }

    fn hard_failure(
        &self,
        owner_id: &str,
        provider: &Provider,
        reason: String,
    ) -> Result<Freshness, CredentialError> {
        warn!(owner_id, %provider, %reason, "credential refresh rejected; reconnect required");
        {
            let mut disconnected = self
                .disconnected
                .lock()
                .map_err(|_| CredentialError::LockPoisoned("disconnected marks"))?;
            disconnected.insert((owner_id.to_string(), provider.clone()), reason.clone());
        }
        self.events.reconnect_required(owner_id, provider);
        Ok(Freshness::Disconnected {
            provider: provider.clone(),
            reason,
        })
    }

    fn disconnected_reason(
        &self,
        owner_id: &str,
        provider: &Provider,
    ) -> Result<Option<String>, CredentialError> {
        let disconnected = self
            .disconnected
            .lock()
            .map_err(|_| CredentialError::LockPoisoned("disconnected marks"))?;
        Ok(disconnected
            .get(&(owner_id.to_string(), provider.clone()))
            .cloned())
    }

    fn clear_disconnected(&self, owner_id: &str, provider: &Provider) -> Result<(), CredentialError> {
        let mut disconnected = self
            .disconnected
            .lock()
            .map_err(|_| CredentialError::LockPoisoned("disconnected marks"))?;
        disconnected.remove(&(owner_id.to_string(), provider.clone()));
        Ok(())
    }

    fn session_token(&self) -> Result<String, CredentialError> {
        self.session_token
            .read()
            .map(|token| token.clone())
            .map_err(|_| CredentialError::LockPoisoned("session token"))
    }
}
