//! Redis-backed room directory.
//!
//! Each room is a sorted set `{prefix}:room:{room_id}` whose members are
//! server ids scored by the unix time their entry expires. An instance that
//! dies without cleaning up simply stops refreshing and ages out; the key
//! itself carries a TTL so abandoned rooms vanish entirely.

use std::sync::Arc;

use async_trait::async_trait;

use crate::redis::RedisPool;

use super::traits::RoomDirectory;
use super::types::{server_channel, ClusterConfig, DirectoryBackend, DirectoryError, RelayMessage};

pub struct RedisRoomDirectory {
    pool: Arc<RedisPool>,
    config: ClusterConfig,
}

impl RedisRoomDirectory {
    pub fn new(pool: Arc<RedisPool>, config: ClusterConfig) -> Self {
        Self { pool, config }
    }

    fn room_key(&self, room_id: &str) -> String {
        room_key(&self.config.directory_prefix, room_id)
    }

    fn ttl(&self) -> i64 {
        self.config.directory_ttl_seconds as i64
    }

    fn channel_for(&self, message: &RelayMessage) -> String {
        match &message.to_server {
            Some(server) => server_channel(&self.config.routing_channel, server),
            None => self.config.routing_channel.clone(),
        }
    }
}

fn room_key(prefix: &str, room_id: &str) -> String {
    format!("{}:room:{}", prefix, room_id)
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl RoomDirectory for RedisRoomDirectory {
    fn server_id(&self) -> &str {
        &self.config.server_id
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn backend_type(&self) -> DirectoryBackend {
        DirectoryBackend::Redis
    }

    async fn register_room(&self, room_id: &str) -> Result<(), DirectoryError> {
        self.refresh_rooms(&[room_id.to_string()]).await?;

        tracing::debug!(
            room_id = %room_id,
            server_id = %self.config.server_id,
            "Room registered in directory"
        );
        Ok(())
    }

    async fn unregister_room(&self, room_id: &str) -> Result<(), DirectoryError> {
        let mut conn = self.pool.connection().await?;

        let _: () = redis::cmd("ZREM")
            .arg(self.room_key(room_id))
            .arg(&self.config.server_id)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(
            room_id = %room_id,
            server_id = %self.config.server_id,
            "Room unregistered from directory"
        );
        Ok(())
    }

    async fn refresh_rooms(&self, room_ids: &[String]) -> Result<usize, DirectoryError> {
        if room_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.connection().await?;
        let expires_at = now_secs() + self.ttl();

        let mut pipe = redis::pipe();
        for room_id in room_ids {
            let key = self.room_key(room_id);
            pipe.cmd("ZADD")
                .arg(&key)
                .arg(expires_at)
                .arg(&self.config.server_id)
                .ignore()
                .cmd("EXPIRE")
                .arg(&key)
                .arg(self.ttl())
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(room_ids.len())
    }

    async fn find_room_servers(&self, room_id: &str) -> Result<Vec<String>, DirectoryError> {
        let mut conn = self.pool.connection().await?;
        let key = self.room_key(room_id);
        let now = now_secs();

        let (servers,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now)
            .ignore()
            .cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg(format!("({}", now))
            .arg("+inf")
            .query_async(&mut conn)
            .await?;

        Ok(servers)
    }

    async fn publish_relay(&self, message: &RelayMessage) -> Result<(), DirectoryError> {
        let payload = serde_json::to_string(message)?;
        let channel = self.channel_for(message);

        self.pool.publish(&channel, &payload).await?;

        tracing::debug!(
            room_id = %message.room_id,
            channel = %channel,
            "Relay message published"
        );
        Ok(())
    }
}
