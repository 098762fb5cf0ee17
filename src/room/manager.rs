use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::{Room, RoomError};

/// Aggregate counts for `/stats` and the gauges
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomStats {
    pub total_rooms: usize,
    pub total_members: usize,
}

/// Owns the room key to `Room` mapping.
///
/// The map's shard lock and a room's member lock are never held together.
/// Emptiness is read from the room's occupancy counter, which `reserve`
/// increments inside the map entry's critical section, so `delete_room` can
/// re-check it atomically with the removal. A removed room is detached: any
/// later `add_member` on a stale handle fails instead of orphaning a member.
pub struct RoomManager {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get_room(&self, key: &str) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RoomError::RoomNotFound(key.to_string()))
    }

    /// Create the room or return the existing one.
    ///
    /// The handle does not hold the room open; joins that may race
    /// `delete_room` go through `reserve`.
    pub fn add_new_room(&self, key: &str) -> Arc<Room> {
        Arc::clone(
            self.rooms
                .entry(key.to_string())
                .or_insert_with(|| {
                    tracing::debug!(room_id = %key, "Room created");
                    Arc::new(Room::new(key))
                })
                .value(),
        )
    }

    /// Create-or-get the room and claim it for an in-flight join.
    ///
    /// The room cannot be deleted until the returned reservation is dropped.
    pub fn reserve(&self, key: &str) -> RoomReservation {
        let entry = self.rooms.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(room_id = %key, "Room created");
            Arc::new(Room::new(key))
        });
        let reserved = entry.value().reserve();
        debug_assert!(reserved, "rooms in the map are never detached");

        RoomReservation {
            room: Arc::clone(entry.value()),
        }
    }

    /// Remove the room if it has no members and no join in flight.
    ///
    /// Returns `true` if the room was removed. Absent keys are a no-op.
    pub fn delete_room(&self, key: &str) -> bool {
        let removed = self
            .rooms
            .remove_if(key, |_, room| room.try_detach())
            .is_some();

        if removed {
            tracing::debug!(room_id = %key, "Room deleted");
        }
        removed
    }

    pub fn room_keys(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub async fn stats(&self) -> RoomStats {
        let rooms = self.rooms();
        let mut total_members = 0;
        for room in &rooms {
            total_members += room.member_count().await;
        }

        RoomStats {
            total_rooms: rooms.len(),
            total_members,
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight join claim on a room, released on drop
#[derive(Debug)]
pub struct RoomReservation {
    room: Arc<Room>,
}

impl RoomReservation {
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }
}

impl Deref for RoomReservation {
    type Target = Room;

    fn deref(&self) -> &Room {
        &self.room
    }
}

impl Drop for RoomReservation {
    fn drop(&mut self) {
        self.room.release();
    }
}
