use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::cluster::RoomDirectory;
use crate::config::WebSocketConfig;
use crate::metrics::{ConnectionMetrics, DirectoryMetrics, HeartbeatMetrics};
use crate::room::RoomManager;

/// Background task keeping this instance's directory entries alive and the
/// room gauges current
pub struct HeartbeatTask {
    config: WebSocketConfig,
    rooms: Arc<RoomManager>,
    directory: Arc<dyn RoomDirectory>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        rooms: Arc<RoomManager>,
        directory: Arc<dyn RoomDirectory>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            rooms,
            directory,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = heartbeat_interval.as_secs(),
            directory_enabled = self.directory.is_enabled(),
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.beat().await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    async fn beat(&self) {
        let start = Instant::now();

        let stats = self.rooms.stats().await;
        ConnectionMetrics::set_room_stats(&stats);

        self.refresh_directory().await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);

        tracing::debug!(
            rooms = stats.total_rooms,
            members = stats.total_members,
            elapsed_ms,
            "Heartbeat round completed"
        );
    }

    /// Refresh directory TTLs for every room held here
    async fn refresh_directory(&self) {
        if !self.directory.is_enabled() {
            return;
        }

        let room_ids = self.rooms.room_keys();
        if room_ids.is_empty() {
            return;
        }

        match self.directory.refresh_rooms(&room_ids).await {
            Ok(refreshed) => {
                DirectoryMetrics::record_refreshed(refreshed);
                tracing::debug!(
                    refreshed,
                    server_id = %self.directory.server_id(),
                    "Refreshed room directory"
                );
            }
            Err(e) => {
                DirectoryMetrics::record_error("refresh");
                tracing::warn!(error = %e, "Failed to refresh room directory");
            }
        }

        self.drop_stale_entries(&room_ids).await;
    }

    /// Rooms deleted between the snapshot and the refresh were re-added by
    /// it; take them back out unless a join has recreated them since.
    async fn drop_stale_entries(&self, room_ids: &[String]) {
        for room_id in room_ids {
            if self.rooms.get_room(room_id).is_ok() {
                continue;
            }

            if let Err(e) = self.directory.unregister_room(room_id).await {
                DirectoryMetrics::record_error("unregister");
                tracing::warn!(room_id = %room_id, error = %e, "Failed to drop stale directory entry");
                continue;
            }
            tracing::debug!(room_id = %room_id, "Dropped stale directory entry");

            if self.rooms.get_room(room_id).is_ok() {
                if let Err(e) = self.directory.register_room(room_id).await {
                    DirectoryMetrics::record_error("register");
                    tracing::warn!(room_id = %room_id, error = %e, "Failed to re-register room in directory");
                }
            }
        }
    }
}
