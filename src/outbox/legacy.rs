use serde_json::{json, Value};
use tracing::{debug, warn};

use super::engine::Outbox;

/// Key prefix older clients used to park a failed workout save.
pub const LEGACY_WORKOUT_PREFIX: &str = "failedWorkout_";

impl Outbox {
    /// Move workouts parked under `failedWorkout_{owner}_*` keys into the
    /// outbox. Returns how many were queued.
    ///
    /// Entries that do not parse are removed. An entry whose enqueue fails is
    /// left in place for the next session.
    pub fn migrate_legacy_failed_workouts(&self, owner_id: &str) -> usize {
        if owner_id.is_empty() {
            return 0;
        }

        let storage = self.store().storage();
        let prefix = format!("{}{}_", LEGACY_WORKOUT_PREFIX, owner_id);
        let keys = match storage.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(owner_id, error = %err, "could not list legacy workouts");
                return 0;
            }
        };

        let mut migrated = 0;
        for key in keys.into_iter().filter(|key| key.starts_with(&prefix)) {
            let workout = match storage.get(&key) {
                Ok(Some(raw)) => serde_json::from_str::<Value>(&raw).ok(),
                Ok(None) => None,
                Err(err) => {
                    warn!(%key, error = %err, "could not read legacy workout");
                    continue;
                }
            };

            match workout {
                Some(workout) if !workout.is_null() => {
                    if self
                        .enqueue(owner_id, "workout", json!({ "workout": workout }))
                        .is_none()
                    {
                        continue;
                    }
                    migrated += 1;
                }
                _ => warn!(%key, "dropping unreadable legacy workout"),
            }

            if let Err(err) = storage.remove(&key) {
                warn!(%key, error = %err, "could not remove legacy workout");
            }
        }

        if migrated > 0 {
            debug!(owner_id, count = migrated, "migrated legacy failed workouts into outbox");
        }
        migrated
    }
}
