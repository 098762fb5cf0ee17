//! Room directory trait definition

use async_trait::async_trait;

use super::types::{DirectoryBackend, DirectoryError, RelayMessage};

/// Shared record of which instances hold live members of which rooms
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    fn server_id(&self) -> &str;

    /// Whether cross-instance routing is active
    fn is_enabled(&self) -> bool;

    fn backend_type(&self) -> DirectoryBackend;

    /// Record that this instance holds `room_id`
    async fn register_room(&self, room_id: &str) -> Result<(), DirectoryError>;

    /// Remove this instance from `room_id`'s owners
    async fn unregister_room(&self, room_id: &str) -> Result<(), DirectoryError>;

    /// Extend this instance's entries for `room_ids`; returns how many were refreshed
    async fn refresh_rooms(&self, room_ids: &[String]) -> Result<usize, DirectoryError>;

    /// Instances with a live entry for `room_id`, possibly including this one
    async fn find_room_servers(&self, room_id: &str) -> Result<Vec<String>, DirectoryError>;

    /// Publish to `to_server`'s channel, or to every instance when it is absent
    async fn publish_relay(&self, message: &RelayMessage) -> Result<(), DirectoryError>;
}
