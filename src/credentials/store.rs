use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::error::CredentialError;
use super::record::{CredentialRecord, Provider};

/// Where connected-account credentials live (the remote backend in
/// production). One record per (owner, provider).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(
        &self,
        owner_id: &str,
        provider: &Provider,
    ) -> Result<Option<CredentialRecord>, CredentialError>;

    /// Insert or replace the record for `(owner_id, record.provider)`.
    async fn save(&self, owner_id: &str, record: &CredentialRecord) -> Result<(), CredentialError>;

    async fn delete(&self, owner_id: &str, provider: &Provider) -> Result<(), CredentialError>;
}

type Key = (String, Provider);

/// In-memory credential store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<HashMap<Key, CredentialRecord>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read for inspection outside async code.
    pub fn get(&self, owner_id: &str, provider: &Provider) -> Option<CredentialRecord> {
        let records = self.records.read().ok()?;
        records
            .get(&(owner_id.to_string(), provider.clone()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(
        &self,
        owner_id: &str,
        provider: &Provider,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        let records = self
            .records
            .read()
            .map_err(|_| CredentialError::LockPoisoned("load"))?;
        Ok(records
            .get(&(owner_id.to_string(), provider.clone()))
            .cloned())
    }

    async fn save(&self, owner_id: &str, record: &CredentialRecord) -> Result<(), CredentialError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| CredentialError::LockPoisoned("save"))?;
        records.insert(
            (owner_id.to_string(), record.provider.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, owner_id: &str, provider: &Provider) -> Result<(), CredentialError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| CredentialError::LockPoisoned("delete"))?;
        records.remove(&(owner_id.to_string(), provider.clone()));
        Ok(())
    }
}
