//! Cluster-related types

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::ClusterConfig;

/// A deliver-to-room command on its way to another instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub room_id: String,
    /// Single recipient; the whole room when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Serialized `WebsocketMessage` envelope, forwarded to sockets as-is
    pub message: String,
    pub from_server: String,
    /// Target instance; absent when broadcast to every instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_server: Option<String>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Redis error: {0}")]
    Redis(#[from] crate::redis::PoolError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("room directory is disabled")]
    Disabled,
}

impl From<redis::RedisError> for DirectoryError {
    fn from(e: redis::RedisError) -> Self {
        Self::Redis(e.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    /// Single instance; no coordination
    Local,
    /// Shared Redis directory with pub/sub routing
    Redis,
}

/// Routing channel of one instance
pub fn server_channel(routing_channel: &str, server_id: &str) -> String {
    format!("{}:{}", routing_channel, server_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_message_omits_empty_targets() {
        let message = RelayMessage {
            room_id: "shop1".to_string(),
            username: None,
            message: r#"{"topic":"t","payload":1}"#.to_string(),
            from_server: "node-a".to_string(),
            to_server: None,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("username").is_none());
        assert!(value.get("to_server").is_none());
        assert_eq!(value["room_id"], "shop1");
    }

    #[test]
    fn test_server_channel() {
        assert_eq!(server_channel("wireset:relay", "node-a"), "wireset:relay:node-a");
    }
}
