//! Single-instance room directory

use async_trait::async_trait;

use super::traits::RoomDirectory;
use super::types::{DirectoryBackend, DirectoryError, RelayMessage};

pub struct LocalRoomDirectory {
    server_id: String,
}

impl LocalRoomDirectory {
    pub fn new(server_id: String) -> Self {
        Self { server_id }
    }
}

#[async_trait]
impl RoomDirectory for LocalRoomDirectory {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn backend_type(&self) -> DirectoryBackend {
        DirectoryBackend::Local
    }

    async fn register_room(&self, _room_id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn unregister_room(&self, _room_id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn refresh_rooms(&self, _room_ids: &[String]) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn find_room_servers(&self, _room_id: &str) -> Result<Vec<String>, DirectoryError> {
        Ok(vec![self.server_id.clone()])
    }

    async fn publish_relay(&self, _message: &RelayMessage) -> Result<(), DirectoryError> {
        Err(DirectoryError::Disabled)
    }
}
