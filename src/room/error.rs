use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

/// Failure to hand a message to one member's outbound channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound buffer is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

impl<T> From<TrySendError<T>> for SendError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        }
    }
}

/// Errors raised by `Room` and `RoomManager`
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room has been closed: {0}")]
    RoomClosed(String),

    #[error("member already exists: {0}")]
    MemberAlreadyExists(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("failed to send to {username}: {source}")]
    Send {
        username: String,
        #[source]
        source: SendError,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RoomError {
    /// Absence of a room or member is an expected outcome, not a fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RoomNotFound(_) | Self::MemberNotFound(_))
    }

    /// Username of the member a send failure belongs to
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Send { username, .. } => Some(username),
            Self::MemberAlreadyExists(username) | Self::MemberNotFound(username) => Some(username),
            _ => None,
        }
    }
}
