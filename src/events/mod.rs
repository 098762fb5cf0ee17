//! Membership change notifications.
//!
//! The gateway publishes `UserJoined` when a member is added and `UserLeft`
//! after cleanup. Publishing never fails a connection: errors are logged by
//! the caller and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EventsConfig;
use crate::redis::{PoolError, RedisPool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MembershipEvent {
    UserJoined {
        room_id: String,
        username: String,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        room_id: String,
        username: String,
        timestamp: DateTime<Utc>,
    },
}

impl MembershipEvent {
    pub fn user_joined(room_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self::UserJoined {
            room_id: room_id.into(),
            username: username.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(room_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self::UserLeft {
            room_id: room_id.into(),
            username: username.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserJoined { .. } => "UserJoined",
            Self::UserLeft { .. } => "UserLeft",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::UserJoined { room_id, .. } | Self::UserLeft { room_id, .. } => room_id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::UserJoined { username, .. } | Self::UserLeft { username, .. } => username,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Redis(#[from] PoolError),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: MembershipEvent) -> Result<(), EventError>;
}

/// Records events in the log only
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: MembershipEvent) -> Result<(), EventError> {
        tracing::info!(
            event = event.name(),
            room_id = %event.room_id(),
            username = %event.username(),
            "Membership event"
        );
        Ok(())
    }
}

/// Publishes events as JSON on a Redis channel
pub struct RedisEventPublisher {
    pool: Arc<RedisPool>,
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(pool: Arc<RedisPool>, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: MembershipEvent) -> Result<(), EventError> {
        let payload = serde_json::to_string(&event)?;
        let receivers = self.pool.publish(&self.channel, &payload).await?;

        tracing::debug!(
            event = event.name(),
            room_id = %event.room_id(),
            channel = %self.channel,
            receivers,
            "Membership event published"
        );
        Ok(())
    }
}

pub fn create_event_publisher(
    config: &EventsConfig,
    pool: Option<Arc<RedisPool>>,
) -> Arc<dyn EventPublisher> {
    match pool {
        Some(pool) if config.enabled => {
            tracing::info!(channel = %config.channel, "Publishing membership events to Redis");
            Arc::new(RedisEventPublisher::new(pool, config.channel.clone()))
        }
        _ => Arc::new(LogEventPublisher),
    }
}
