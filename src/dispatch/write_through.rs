use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::error::RemoteError;
use super::mutation::Mutation;
use super::writer::{RemoteWriter, WriteOptions};
use crate::outbox::Outbox;

/// Result of a write-through call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Delivered,
    /// The write failed and was queued for later delivery.
    Queued { id: String },
    /// The write failed and could not be queued.
    Failed(RemoteError),
}

/// Wraps a writer so failed writes fall back to the outbox.
///
/// The wrapped writer is always called with [`WriteOptions::direct`]. As a
/// [`RemoteWriter`], a failed call that was queued reports success; pass
/// `allow_outbox: false` to see the failure instead.
pub struct WriteThrough<W> {
    inner: W,
    outbox: Arc<Outbox>,
}

impl<W: RemoteWriter> WriteThrough<W> {
    pub fn new(inner: W, outbox: Arc<Outbox>) -> Self {
        Self { inner, outbox }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Try the write now; queue it if that fails. Kinds without a handler go
    /// straight to the queue.
    pub async fn write(&self, owner_id: &str, mutation: Mutation) -> WriteOutcome {
        let attempt = match &mutation {
            Mutation::Unknown { .. } => Err(RemoteError::transport("no handler for kind")),
            known => self.attempt(owner_id, known).await,
        };

        match attempt {
            Ok(()) => WriteOutcome::Delivered,
            Err(err) => match self.queue(owner_id, mutation, &err) {
                Some(id) => WriteOutcome::Queued { id },
                None => WriteOutcome::Failed(err),
            },
        }
    }

    async fn attempt(&self, owner_id: &str, mutation: &Mutation) -> Result<(), RemoteError> {
        let direct = WriteOptions::direct();
        match mutation {
            Mutation::Workout { workout } => self.inner.save_workout(owner_id, workout, direct).await,
            Mutation::Metrics { date, metrics } => {
                self.inner.save_metrics(owner_id, date, metrics, direct).await
            }
            Mutation::Meal { date, meal } => self.inner.save_meal(owner_id, date, meal, direct).await,
            Mutation::FeedItem { feed_item } => {
                self.inner.save_feed_item(owner_id, feed_item, direct).await
            }
            Mutation::Unknown { .. } => Ok(()),
        }
    }

    fn queue(&self, owner_id: &str, mutation: Mutation, err: &RemoteError) -> Option<String> {
        let (kind, payload) = mutation.into_parts();
        let queued = self.outbox.enqueue(owner_id, &kind, payload)?;
        info!(%kind, owner_id, id = %queued.id, error = %err, "write failed; queued for sync");
        Some(queued.id)
    }

    async fn guarded(
        &self,
        owner_id: &str,
        mutation: Mutation,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        match self.attempt(owner_id, &mutation).await {
            Ok(()) => Ok(()),
            Err(err) if options.allow_outbox => match self.queue(owner_id, mutation, &err) {
                Some(_) => Ok(()),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<W: RemoteWriter> RemoteWriter for WriteThrough<W> {
    async fn save_workout(
        &self,
        owner_id: &str,
        workout: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        let mutation = Mutation::Workout {
            workout: workout.clone(),
        };
        self.guarded(owner_id, mutation, options).await
    }

    async fn save_metrics(
        &self,
        owner_id: &str,
        date: &str,
        metrics: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        let mutation = Mutation::Metrics {
            date: date.to_string(),
            metrics: metrics.clone(),
        };
        self.guarded(owner_id, mutation, options).await
    }

    async fn save_meal(
        &self,
        owner_id: &str,
        date: &str,
        meal: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        let mutation = Mutation::Meal {
            date: date.to_string(),
            meal: meal.clone(),
        };
        self.guarded(owner_id, mutation, options).await
    }

    async fn save_feed_item(
        &self,
        owner_id: &str,
        feed_item: &Value,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        let mutation = Mutation::FeedItem {
            feed_item: feed_item.clone(),
        };
        self.guarded(owner_id, mutation, options).await
    }
}
