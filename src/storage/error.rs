use std::fmt;

/// Error raised by a key-value storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not read or write (filesystem error, disabled storage).
    Io(String),
    /// The write would exceed the backend's size quota.
    QuotaExceeded { key: String, quota: usize },
    /// A stored value could not be decoded.
    Corrupt(String),
    /// An internal lock was poisoned by a panicking writer.
    LockPoisoned(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "storage i/o failed: {}", msg),
            StoreError::QuotaExceeded { key, quota } => {
                write!(f, "storage quota of {} bytes exceeded writing {}", quota, key)
            }
            StoreError::Corrupt(msg) => write!(f, "stored value is corrupt: {}", msg),
            StoreError::LockPoisoned(operation) => {
                write!(f, "storage lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
