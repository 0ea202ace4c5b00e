use std::fmt;

/// Failure reported by a remote write collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced a response (offline, timeout, DNS).
    Transport(String),
    /// The backend answered with an error.
    Rejected { status: u16, message: String },
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Transport(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(msg) => write!(f, "{}", msg),
            RemoteError::Rejected { status, message } => {
                write!(f, "backend rejected write ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for RemoteError {}

/// Why a queued record could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A required payload field is absent or null.
    MissingField(&'static str),
    /// A field is present but has the wrong shape.
    InvalidPayload(String),
    /// The remote write failed.
    Remote(RemoteError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MissingField(field) => write!(f, "payload is missing {}", field),
            DispatchError::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            DispatchError::Remote(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RemoteError> for DispatchError {
    fn from(err: RemoteError) -> Self {
        DispatchError::Remote(err)
    }
}
