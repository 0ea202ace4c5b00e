use std::fmt;

use serde_json::{json, Value};

use super::error::DispatchError;

/// The write kinds this client knows how to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Workout,
    Metrics,
    Meal,
    FeedItem,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::Workout,
        MutationKind::Metrics,
        MutationKind::Meal,
        MutationKind::FeedItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Workout => "workout",
            MutationKind::Metrics => "metrics",
            MutationKind::Meal => "meal",
            MutationKind::FeedItem => "feed_item",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == kind)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded write intent.
///
/// Kinds written by newer clients decode to `Unknown` and carry their payload
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Workout { workout: Value },
    Metrics { date: String, metrics: Value },
    Meal { date: String, meal: Value },
    FeedItem { feed_item: Value },
    Unknown { kind: String, payload: Value },
}

impl Mutation {
    /// Decode a queued payload, checking the fields its handler requires.
    pub fn decode(kind: &str, payload: &Value) -> Result<Self, DispatchError> {
        let Some(known) = MutationKind::parse(kind) else {
            return Ok(Mutation::Unknown {
                kind: kind.to_string(),
                payload: payload.clone(),
            });
        };

        match known {
            MutationKind::Workout => {
                // Older clients queued the workout object itself.
                let workout = match payload.get("workout") {
                    Some(workout) => present(Some(workout), "workout")?,
                    None if payload.get("date").is_some() => payload.clone(),
                    None => return Err(DispatchError::MissingField("workout")),
                };
                if !workout.is_object() {
                    return Err(DispatchError::InvalidPayload(
                        "workout must be an object".into(),
                    ));
                }
                Ok(Mutation::Workout { workout })
            }
            MutationKind::Metrics => Ok(Mutation::Metrics {
                date: date(payload)?,
                metrics: present(payload.get("metrics"), "metrics")?,
            }),
            MutationKind::Meal => Ok(Mutation::Meal {
                date: date(payload)?,
                meal: present(payload.get("meal"), "meal")?,
            }),
            MutationKind::FeedItem => Ok(Mutation::FeedItem {
                feed_item: present(payload.get("feedItem"), "feedItem")?,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Mutation::Workout { .. } => MutationKind::Workout.as_str(),
            Mutation::Metrics { .. } => MutationKind::Metrics.as_str(),
            Mutation::Meal { .. } => MutationKind::Meal.as_str(),
            Mutation::FeedItem { .. } => MutationKind::FeedItem.as_str(),
            Mutation::Unknown { kind, .. } => kind,
        }
    }

    /// The `(kind, payload)` pair stored in a queue record.
    pub fn into_parts(self) -> (String, Value) {
        match self {
            Mutation::Workout { workout } => ("workout".into(), json!({ "workout": workout })),
            Mutation::Metrics { date, metrics } => {
                ("metrics".into(), json!({ "date": date, "metrics": metrics }))
            }
            Mutation::Meal { date, meal } => ("meal".into(), json!({ "date": date, "meal": meal })),
            Mutation::FeedItem { feed_item } => {
                ("feed_item".into(), json!({ "feedItem": feed_item }))
            }
            Mutation::Unknown { kind, payload } => (kind, payload),
        }
    }
}

fn present(value: Option<&Value>, field: &'static str) -> Result<Value, DispatchError> {
    match value {
        Some(Value::Null) | None => Err(DispatchError::MissingField(field)),
        Some(value) => Ok(value.clone()),
    }
}

fn date(payload: &Value) -> Result<String, DispatchError> {
    match payload.get("date") {
        Some(Value::String(date)) if !date.is_empty() => Ok(date.clone()),
        Some(Value::Null) | None => Err(DispatchError::MissingField("date")),
        Some(_) => Err(DispatchError::InvalidPayload(
            "date must be a non-empty string".into(),
        )),
    }
}
