//! Factory function for creating room directories

use std::sync::Arc;

use crate::redis::RedisPool;

use super::local::LocalRoomDirectory;
use super::redis_store::RedisRoomDirectory;
use super::traits::RoomDirectory;
use super::types::ClusterConfig;

pub fn create_room_directory(
    config: &ClusterConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn RoomDirectory> {
    if config.enabled {
        if let Some(pool) = redis_pool {
            tracing::info!(
                server_id = %config.server_id,
                directory_ttl = config.directory_ttl_seconds,
                "Creating Redis room directory for cluster mode"
            );
            Arc::new(RedisRoomDirectory::new(pool, config.clone()))
        } else {
            tracing::warn!(
                "Cluster mode enabled but Redis pool not available, falling back to local mode"
            );
            Arc::new(LocalRoomDirectory::new(config.server_id.clone()))
        }
    } else {
        tracing::info!("Cluster mode disabled, using local room directory");
        Arc::new(LocalRoomDirectory::new(config.server_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::DirectoryBackend;

    #[test]
    fn test_create_local_directory() {
        let config = ClusterConfig {
            enabled: false,
            ..Default::default()
        };

        let directory = create_room_directory(&config, None);
        assert!(!directory.is_enabled());
        assert_eq!(directory.backend_type(), DirectoryBackend::Local);
    }

    #[test]
    fn test_enabled_without_pool_falls_back_to_local() {
        let config = ClusterConfig {
            enabled: true,
            ..Default::default()
        };

        let directory = create_room_directory(&config, None);
        assert_eq!(directory.backend_type(), DirectoryBackend::Local);
    }
}
