//! Client-side ids for queued payloads.
//!
//! A record can be delivered more than once (the server may accept a write
//! whose response never arrives). Stamping an id before the record is stored
//! lets the backend upsert instead of duplicating.

use serde_json::{Map, Value};
use uuid::{Uuid, Variant, Version};

/// Give the payload a stable id for its kind. Kinds without an id field are
/// returned unchanged.
pub fn normalize_payload(kind: &str, mut payload: Value) -> Value {
    match kind {
        "workout" => {
            let nested = payload
                .get("workout")
                .map_or(false, |workout| workout.is_object());
            let target = if nested {
                payload.get_mut("workout").and_then(Value::as_object_mut)
            } else {
                payload.as_object_mut()
            };
            if let Some(workout) = target {
                ensure_uuid(workout);
            }
        }
        "feed_item" => {
            if let Some(item) = payload.get_mut("feedItem").and_then(Value::as_object_mut) {
                ensure_uuid(item);
            }
        }
        "meal" => {
            if let Some(meal) = payload.get_mut("meal").and_then(Value::as_object_mut) {
                ensure_string_id(meal);
            }
        }
        _ => {}
    }
    payload
}

/// Whether `id` is a canonical hyphenated UUID v4.
pub fn is_uuid_v4(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    Uuid::parse_str(id).map_or(false, |uuid| {
        uuid.get_version() == Some(Version::Random) && uuid.get_variant() == Variant::RFC4122
    })
}

fn ensure_uuid(object: &mut Map<String, Value>) {
    let valid = object
        .get("id")
        .and_then(Value::as_str)
        .map_or(false, is_uuid_v4);
    if !valid {
        object.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
}

fn ensure_string_id(object: &mut Map<String, Value>) {
    let id = match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => return,
        Some(Value::Number(n)) => n.to_string(),
        _ => Uuid::new_v4().to_string(),
    };
    object.insert("id".into(), Value::String(id));
}
