use async_trait::async_trait;
use serde_json::Value;

use super::error::RemoteError;

/// Per-call options for a remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Queue the write for later delivery when it fails.
    pub allow_outbox: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { allow_outbox: true }
    }
}

impl WriteOptions {
    /// A single attempt with no fallback to the outbox. Used when the outbox
    /// itself is delivering, so a failure cannot queue a duplicate.
    pub fn direct() -> Self {
        Self {
            allow_outbox: false,
        }
    }
}

/// The backend write API, one method per mutation kind.
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn save_workout(
        &self,
        owner_id: &str,
        workout: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError>;

    async fn save_metrics(
        &self,
        owner_id: &str,
        date: &str,
        metrics: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError>;

    async fn save_meal(
        &self,
        owner_id: &str,
        date: &str,
        meal: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError>;

    async fn save_feed_item(
        &self,
        owner_id: &str,
        feed_item: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteWriter + ?Sized> RemoteWriter for std::sync::Arc<T> {
    async fn save_workout(
        &self,
        owner_id: &str,
        workout: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        (**self).save_workout(owner_id, workout, options).await
    }

    async fn save_metrics(
        &self,
        owner_id: &str,
        date: &str,
        metrics: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        (**self).save_metrics(owner_id, date, metrics, options).await
    }

    async fn save_meal(
        &self,
        owner_id: &str,
        date: &str,
        meal: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        (**self).save_meal(owner_id, date, meal, options).await
    }

    async fn save_feed_item(
        &self,
        owner_id: &str,
        feed_item: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        (**self).save_feed_item(owner_id, feed_item, options).await
    }
}
