use std::fmt;

/// Failure of the credential store itself, as opposed to a refresh failure.
///
/// `Clone` so one de-duplicated refresh result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The backing store could not be read or written.
    Store(String),
    /// An internal lock was poisoned.
    LockPoisoned(&'static str),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::Store(msg) => write!(f, "credential store error: {}", msg),
            CredentialError::LockPoisoned(operation) => {
                write!(f, "credential lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for CredentialError {}

/// Why a token refresh exchange failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The provider refused the refresh token. Retrying will not help.
    Rejected { status: u16, message: String },
    /// Network or server trouble. The next scheduled check may succeed.
    Transient(String),
}

impl RefreshError {
    /// Classify a non-success HTTP status from the refresh endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 401 | 403 => RefreshError::Rejected { status, message },
            _ => RefreshError::Transient(format!("refresh endpoint returned {}: {}", status, message)),
        }
    }

    pub fn is_hard(&self) -> bool {
        matches!(self, RefreshError::Rejected { .. })
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::Rejected { status, message } => {
                write!(f, "refresh rejected ({}): {}", status, message)
            }
            RefreshError::Transient(msg) => write!(f, "refresh failed: {}", msg),
        }
    }
}

impl std::error::Error for RefreshError {}
