use std::fmt;

use async_trait::async_trait;

use super::error::RefreshError;
use super::record::Provider;

/// Input to one refresh exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub owner_id: String,
    pub provider: Provider,
    pub refresh_token: String,
    /// The signed-in user's session bearer, authorizing the call to the
    /// refresh endpoint.
    pub session_token: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("owner_id", &self.owner_id)
            .field("provider", &self.provider)
            .field("refresh_token", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// `None` when the provider did not rotate the refresh token.
    pub refresh_token: Option<String>,
    /// Epoch ms.
    pub expires_at: i64,
    pub token_type: Option<String>,
}

/// Performs the refresh exchange against a trusted server-side endpoint.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, request: RefreshRequest) -> Result<RefreshedTokens, RefreshError>;
}
