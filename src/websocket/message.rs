use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

/// Topic used for every error reported back to a client
pub const TOPIC_ERROR: &str = "error";

/// Sender label carried by server-originated system messages
pub const SYSTEM_SENDER: &str = "system";

/// JSON envelope exchanged in both directions: `{"topic": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketMessage<T> {
    pub topic: String,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl<T> WebsocketMessage<T> {
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            payload,
            sender: None,
        }
    }

    /// Mark the message as originating from the server itself
    pub fn from_system(mut self) -> Self {
        self.sender = Some(SYSTEM_SENDER.to_string());
        self
    }
}

/// Payload of the `error` topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl WebsocketMessage<ErrorPayload> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            TOPIC_ERROR,
            ErrorPayload {
                message: message.into(),
            },
        )
    }
}

/// A message already serialized to JSON text.
///
/// Encoding happens once per send call; broadcasts share the same buffer
/// across every member's outbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    text: Arc<str>,
}

impl OutboundMessage {
    pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string(message)?;
        Ok(Self { text: text.into() })
    }

    /// Wrap JSON text that was serialized elsewhere (e.g. a relayed message)
    pub fn from_json(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Errors raised while reading an inbound frame
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("topic is empty")]
    MissingTopic,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

/// Inbound frame with the topic extracted and the payload left undecoded
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: Payload,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let topic = match raw.topic {
            Some(topic) if !topic.trim().is_empty() => topic,
            _ => return Err(FrameError::MissingTopic),
        };

        Ok(Self {
            topic,
            payload: Payload(raw.payload.map(Arc::from)),
        })
    }
}

/// Opaque JSON payload handed to topic handlers.
///
/// Each handler decodes the shape it expects; a missing payload decodes as
/// JSON `null`.
#[derive(Debug, Clone, Default)]
pub struct Payload(Option<Arc<RawValue>>);

impl Payload {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.0 {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("null"),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.0.as_deref().map(RawValue::get)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}
