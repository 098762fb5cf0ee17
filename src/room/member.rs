use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

use super::SendError;

/// One live connection's participation in a room
#[derive(Debug)]
pub struct Member {
    pub connection_id: Uuid,
    pub username: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
}

impl Member {
    pub fn new(username: impl Into<String>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self::with_connection_id(Uuid::new_v4(), username, sender)
    }

    pub fn with_connection_id(
        connection_id: Uuid,
        username: impl Into<String>,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            connection_id,
            username: username.into(),
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queue a message without waiting.
    ///
    /// A member whose buffer is full fails this send instead of stalling the
    /// caller, which usually holds the room's read lock.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.sender.try_send(message).map_err(SendError::from)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
