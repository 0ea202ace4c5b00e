use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::refresh::RefreshedTokens;
use crate::clock::duration_ms;

/// Default auth scheme for provider access tokens.
pub const BEARER: &str = "Bearer";

/// Refresh when the access token expires within this window.
pub const DEFAULT_REFRESH_HORIZON: Duration = Duration::from_secs(15 * 60);

/// A wearable data provider reached through OAuth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    Fitbit,
    Oura,
    /// A provider this build has no special handling for.
    Other(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Fitbit => "fitbit",
            Provider::Oura => "oura",
            Provider::Other(name) => name,
        }
    }
}

impl From<String> for Provider {
    fn from(name: String) -> Self {
        match name.as_str() {
            "fitbit" => Provider::Fitbit,
            "oura" => Provider::Oura,
            _ => Provider::Other(name),
        }
    }
}

impl From<&str> for Provider {
    fn from(name: &str) -> Self {
        Provider::from(name.to_string())
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one (owner, provider) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Access token is good for longer than the refresh horizon.
    Valid,
    /// Access token expires within the horizon, has expired, or has no known expiry.
    NeedsRefresh,
    /// The provider rejected the refresh token; only a reconnect helps.
    Disconnected,
}

/// OAuth state for one (owner, provider) pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub provider: Provider,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Epoch ms after which `access_token` is invalid. `None` when unknown.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

impl CredentialRecord {
    pub fn new(
        provider: Provider,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            provider,
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            token_type: default_token_type(),
        }
    }

    /// Classify against the refresh horizon. Never returns `Disconnected`;
    /// that state is tracked by the credential manager.
    pub fn state_at(&self, now_ms: i64, horizon: Duration) -> CredentialState {
        match self.expires_at {
            Some(expires_at) if expires_at > now_ms.saturating_add(duration_ms(horizon)) => {
                CredentialState::Valid
            }
            _ => CredentialState::NeedsRefresh,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.map_or(true, |expires_at| now_ms >= expires_at)
    }

    /// Time left before expiry, or `None` if expired or unknown.
    pub fn time_until_expiry(&self, now_ms: i64) -> Option<Duration> {
        let remaining = self.expires_at?.checked_sub(now_ms)?;
        u64::try_from(remaining)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Value for an `Authorization` header on provider API calls.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// The record after a successful refresh. A response without a new
    /// refresh token keeps the current one.
    pub fn refreshed(&self, tokens: RefreshedTokens) -> Self {
        Self {
            provider: self.provider.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: Some(tokens.expires_at),
            token_type: tokens.token_type.unwrap_or_else(|| self.token_type.clone()),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}
