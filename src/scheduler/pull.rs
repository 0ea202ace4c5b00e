use std::fmt;

use async_trait::async_trait;

use crate::credentials::CredentialRecord;

/// A provider data pull failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullError(pub String);

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider pull failed: {}", self.0)
    }
}

impl std::error::Error for PullError {}

/// Fetches new data from a provider with a fresh credential.
#[async_trait]
pub trait ProviderPull: Send + Sync {
    async fn pull(&self, owner_id: &str, credential: &CredentialRecord) -> Result<(), PullError>;
}

/// Refresh credentials only; pull nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPull;

#[async_trait]
impl ProviderPull for NoopPull {
    async fn pull(&self, _owner_id: &str, _credential: &CredentialRecord) -> Result<(), PullError> {
        Ok(())
    }
}
