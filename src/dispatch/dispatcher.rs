use std::sync::Arc;

use serde_json::Value;

use super::error::DispatchError;
use super::mutation::Mutation;
use super::writer::{RemoteWriter, WriteOptions};

/// Outcome of dispatching one queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The remote write succeeded.
    Delivered,
    /// No handler exists for the kind; the record must be kept as-is.
    Unrecognized,
}

/// Routes a queued `(kind, payload)` to the matching remote write.
#[derive(Clone)]
pub struct Dispatcher {
    writer: Arc<dyn RemoteWriter>,
}

impl Dispatcher {
    pub fn new(writer: Arc<dyn RemoteWriter>) -> Self {
        Self { writer }
    }

    /// Perform exactly one remote write. Handlers are always called with
    /// [`WriteOptions::direct`].
    pub async fn dispatch(
        &self,
        owner_id: &str,
        kind: &str,
        payload: &Value,
    ) -> Result<Delivery, DispatchError> {
        let options = WriteOptions::direct();
        match Mutation::decode(kind, payload)? {
            Mutation::Workout { workout } => {
                self.writer.save_workout(owner_id, &workout, options).await?
            }
            Mutation::Metrics { date, metrics } => {
                self.writer
                    .save_metrics(owner_id, &date, &metrics, options)
                    .await?
            }
            Mutation::Meal { date, meal } => {
                self.writer.save_meal(owner_id, &date, &meal, options).await?
            }
            Mutation::FeedItem { feed_item } => {
                self.writer
                    .save_feed_item(owner_id, &feed_item, options)
                    .await?
            }
            Mutation::Unknown { .. } => return Ok(Delivery::Unrecognized),
        }
        Ok(Delivery::Delivered)
    }
}
