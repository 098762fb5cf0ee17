use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Identity;
use crate::room::{Member, Room, RoomError, SendError};

use super::{ErrorPayload, OutboundMessage, WebsocketMessage, TOPIC_ERROR};

/// A joined connection as seen by topic handlers
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    room: Arc<Room>,
    sender: mpsc::Sender<OutboundMessage>,
}

impl Connection {
    pub fn new(identity: Identity, room: Arc<Room>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            connected_at: Utc::now(),
            room,
            sender,
        }
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn room_id(&self) -> &str {
        self.identity.room()
    }

    pub fn username(&self) -> &str {
        self.identity.username()
    }

    /// The room membership record for this connection
    pub(crate) fn member(&self) -> Member {
        Member::with_connection_id(self.id, self.username(), self.sender.clone())
    }

    /// Queue a message to this connection only
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), RoomError> {
        let encoded = OutboundMessage::encode(message)?;
        self.send_encoded(encoded)
    }

    pub fn send_encoded(&self, message: OutboundMessage) -> Result<(), RoomError> {
        self.sender
            .try_send(message)
            .map_err(|e| RoomError::Send {
                username: self.username().to_string(),
                source: SendError::from(e),
            })
    }

    pub fn reply<T: Serialize>(&self, topic: &str, payload: T) -> Result<(), RoomError> {
        self.send(&WebsocketMessage::new(topic, payload))
    }

    pub fn send_error(&self, message: impl Into<String>) -> Result<(), RoomError> {
        self.reply(
            TOPIC_ERROR,
            ErrorPayload {
                message: message.into(),
            },
        )
    }
}
