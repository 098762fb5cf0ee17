use std::fmt;

use thiserror::Error;

use crate::room::RoomError;
use crate::websocket::FrameError;

/// Failure of a single topic handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Every handler failure from one dispatch
#[derive(Debug)]
pub struct HandlerErrors(pub Vec<HandlerError>);

impl HandlerErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerError> {
        self.0.iter()
    }
}

impl fmt::Display for HandlerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            errors => {
                write!(f, "{} handlers failed: ", errors.len())?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for HandlerErrors {}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),

    #[error("no handler registered for topic: {0}")]
    HandlerNotFound(String),

    #[error(transparent)]
    Handlers(HandlerErrors),
}

impl DispatchError {
    /// Metric label for the outcome
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "invalid",
            Self::HandlerNotFound(_) => "not_found",
            Self::Handlers(_) => "handler_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_message() {
        let one = HandlerErrors(vec![HandlerError::Panicked("boom".into())]);
        assert_eq!(one.to_string(), "handler panicked: boom");

        let two = HandlerErrors(vec![
            HandlerError::Panicked("a".into()),
            HandlerError::Other(anyhow::anyhow!("b")),
        ]);
        assert_eq!(two.to_string(), "2 handlers failed: handler panicked: a; b");
    }
}
