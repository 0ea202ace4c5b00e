//! Synchronous key-value storage backends.
//!
//! The outbox persists into a small string-keyed store with the same shape as
//! browser local storage: whole values are read and written at once, and
//! every call may fail.

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List every key currently stored.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
