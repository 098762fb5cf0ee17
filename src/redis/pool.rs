use std::sync::Arc;

use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::OnceCell;

use crate::config::RedisConfig;

use super::RedisHealth;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
}

/// Lazily connected Redis handle.
///
/// Commands share one auto-reconnecting `ConnectionManager`; pub/sub
/// subscribers get a dedicated connection each through `pubsub`.
pub struct RedisPool {
    client: Client,
    manager: OnceCell<ConnectionManager>,
    health: Arc<RedisHealth>,
    config: RedisConfig,
}

impl RedisPool {
    /// Parses the URL only; no connection is made until first use
    pub fn new(config: RedisConfig, health: Arc<RedisHealth>) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            manager: OnceCell::new(),
            health,
            config,
        })
    }

    pub async fn connection(&self) -> Result<ConnectionManager, PoolError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = self.client.get_connection_manager().await;
                match &manager {
                    Ok(_) => {
                        self.health.set_connected();
                        tracing::info!("Redis command connection established");
                    }
                    Err(e) => {
                        self.health.set_reconnecting();
                        tracing::error!(error = %e, "Failed to connect to Redis");
                    }
                }
                manager
            })
            .await?;

        Ok(manager.clone())
    }

    pub async fn pubsub(&self) -> Result<PubSub, PoolError> {
        Ok(self.client.get_async_pubsub().await?)
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize, PoolError> {
        let mut conn = self.connection().await?;
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub fn health(&self) -> &Arc<RedisHealth> {
        &self.health
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let pool = RedisPool::new(
            RedisConfig {
                url: "redis://127.0.0.1:1".to_string(),
            },
            Arc::new(RedisHealth::new()),
        )
        .unwrap();
        assert_eq!(pool.url(), "redis://127.0.0.1:1");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisPool::new(
            RedisConfig {
                url: "not a url".to_string(),
            },
            Arc::new(RedisHealth::new()),
        );
        assert!(result.is_err());
    }
}
