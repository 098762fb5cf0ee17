use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::websocket::{ErrorPayload, OutboundMessage, WebsocketMessage, TOPIC_ERROR};

use super::{Member, RoomError};

/// Occupancy value of a room that has been removed from its manager
const DETACHED: usize = usize::MAX;

/// Live members of one tenant
pub struct Room {
    id: String,
    members: RwLock<HashMap<String, Member>>,
    /// Members plus outstanding join reservations, or `DETACHED` once the
    /// manager has removed the room. Never incremented past `DETACHED`.
    occupancy: AtomicUsize,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: RwLock::new(HashMap::new()),
            occupancy: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn is_member_exists(&self, username: &str) -> bool {
        self.members.read().await.contains_key(username)
    }

    /// Add a member under its username; an existing member is never replaced.
    ///
    /// Fails with `RoomClosed` once the manager has removed this room, so a
    /// stale handle can never hold members nobody can reach.
    pub async fn add_member(&self, member: Member) -> Result<(), RoomError> {
        let mut members = self.members.write().await;

        if members.contains_key(&member.username) {
            return Err(RoomError::MemberAlreadyExists(member.username));
        }
        if !self.try_occupy() {
            return Err(RoomError::RoomClosed(self.id.clone()));
        }

        members.insert(member.username.clone(), member);
        Ok(())
    }

    /// Remove a member, returning it
    pub async fn delete_member(&self, username: &str) -> Result<Member, RoomError> {
        let mut members = self.members.write().await;

        let member = members
            .remove(username)
            .ok_or_else(|| RoomError::MemberNotFound(username.to_string()))?;
        self.occupancy.fetch_sub(1, Ordering::SeqCst);
        Ok(member)
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn send_message_to<T: Serialize + ?Sized>(
        &self,
        username: &str,
        message: &T,
    ) -> Result<(), RoomError> {
        let encoded = OutboundMessage::encode(message)?;
        self.send_encoded_to(username, encoded).await
    }

    pub async fn send_encoded_to(
        &self,
        username: &str,
        message: OutboundMessage,
    ) -> Result<(), RoomError> {
        let members = self.members.read().await;

        let member = members
            .get(username)
            .ok_or_else(|| RoomError::MemberNotFound(username.to_string()))?;

        member.send(message).map_err(|source| RoomError::Send {
            username: username.to_string(),
            source,
        })
    }

    /// Send a message labelled with the system sender
    pub async fn send_system_message<T: Serialize>(
        &self,
        username: &str,
        topic: &str,
        payload: T,
    ) -> Result<(), RoomError> {
        let message = WebsocketMessage::new(topic, payload).from_system();
        self.send_message_to(username, &message).await
    }

    pub async fn send_system_error(
        &self,
        username: &str,
        message: impl Into<String>,
    ) -> Result<(), RoomError> {
        let payload = ErrorPayload {
            message: message.into(),
        };
        self.send_system_message(username, TOPIC_ERROR, payload).await
    }

    /// Send to every member; returns one error per member that failed
    pub async fn broadcast_message<T: Serialize + ?Sized>(&self, message: &T) -> Vec<RoomError> {
        match OutboundMessage::encode(message) {
            Ok(encoded) => self.broadcast_encoded(&encoded).await,
            Err(e) => vec![RoomError::Encode(e)],
        }
    }

    pub async fn broadcast_encoded(&self, message: &OutboundMessage) -> Vec<RoomError> {
        let members = self.members.read().await;

        members
            .values()
            .filter_map(|member| {
                member
                    .send(message.clone())
                    .err()
                    .map(|source| RoomError::Send {
                        username: member.username.clone(),
                        source,
                    })
            })
            .collect()
    }

    pub(crate) fn occupancy(&self) -> usize {
        match self.occupancy.load(Ordering::SeqCst) {
            DETACHED => 0,
            n => n,
        }
    }

    /// Whether the manager has removed this room
    pub fn is_detached(&self) -> bool {
        self.occupancy.load(Ordering::SeqCst) == DETACHED
    }

    /// Take one unit of occupancy unless the room is detached
    fn try_occupy(&self) -> bool {
        self.occupancy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n != DETACHED).then_some(n + 1)
            })
            .is_ok()
    }

    /// Mark the room removed if nothing occupies it. Called by the manager
    /// inside the map entry's critical section.
    pub(crate) fn try_detach(&self) -> bool {
        self.occupancy
            .compare_exchange(0, DETACHED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn reserve(&self) -> bool {
        self.try_occupy()
    }

    pub(crate) fn release(&self) {
        self.occupancy.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::SendError;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn member(username: &str) -> (Member, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Member::new(username, tx), rx)
    }

    #[tokio::test]
    async fn test_add_and_delete_member() {
        let room = Room::new("shop1");
        let (alice, _rx) = member("alice");

        room.add_member(alice).await.unwrap();
        assert!(room.is_member_exists("alice").await);
        assert!(!room.is_empty().await);
        assert_eq!(room.occupancy(), 1);

        let removed = room.delete_member("alice").await.unwrap();
        assert_eq!(removed.username, "alice");
        assert!(room.is_empty().await);
        assert_eq!(room.occupancy(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_member_is_rejected_and_original_kept() {
        let room = Room::new("shop1");
        let (first, mut first_rx) = member("alice");
        let first_id = first.connection_id;
        let (second, _second_rx) = member("alice");

        room.add_member(first).await.unwrap();
        let err = room.add_member(second).await.unwrap_err();
        assert!(matches!(err, RoomError::MemberAlreadyExists(ref name) if name == "alice"));

        // Messages still reach the first connection
        room.send_message_to("alice", &json!({"topic": "t", "payload": 1}))
            .await
            .unwrap();
        assert!(first_rx.try_recv().is_ok());

        let removed = room.delete_member("alice").await.unwrap();
        assert_eq!(removed.connection_id, first_id);
    }

    #[tokio::test]
    async fn test_delete_unknown_member() {
        let room = Room::new("shop1");
        let err = room.delete_member("ghost").await.unwrap_err();
        assert!(matches!(err, RoomError::MemberNotFound(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_send_message_to_unknown_member() {
        let room = Room::new("shop1");
        let err = room.send_message_to("ghost", &json!({})).await.unwrap_err();
        assert!(matches!(err, RoomError::MemberNotFound(_)));
    }

    #[tokio::test]
    async fn test_system_error_envelope() {
        let room = Room::new("shop1");
        let (alice, mut rx) = member("alice");
        room.add_member(alice).await.unwrap();

        room.send_system_error("alice", "nope").await.unwrap();

        let received = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(received.as_str()).unwrap();
        assert_eq!(value["topic"], "error");
        assert_eq!(value["payload"]["message"], "nope");
        assert_eq!(value["sender"], "system");
    }

    #[tokio::test]
    async fn test_broadcast_collects_each_failure_and_keeps_delivering() {
        let room = Room::new("shop1");
        let (a, a_rx) = member("a");
        let (b, mut b_rx) = member("b");
        let (c, mut c_rx) = member("c");
        room.add_member(a).await.unwrap();
        room.add_member(b).await.unwrap();
        room.add_member(c).await.unwrap();

        // A's connection is gone
        drop(a_rx);

        let errors = room
            .broadcast_message(&WebsocketMessage::new("news", json!({"v": 1})))
            .await;

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].username(), Some("a"));
        assert!(matches!(
            errors[0],
            RoomError::Send {
                source: SendError::Closed,
                ..
            }
        ));
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_block_other_members() {
        let room = Room::new("shop1");
        let (tx_slow, _slow_rx) = mpsc::channel(1);
        room.add_member(Member::new("slow", tx_slow)).await.unwrap();
        let (fast, mut fast_rx) = member("fast");
        room.add_member(fast).await.unwrap();

        let msg = WebsocketMessage::new("tick", 1);
        assert!(room.broadcast_message(&msg).await.is_empty());

        let errors = room.broadcast_message(&msg).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].username(), Some("slow"));

        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_usernames_are_sorted() {
        let room = Room::new("shop1");
        let (b, _b_rx) = member("bob");
        let (a, _a_rx) = member("alice");
        room.add_member(b).await.unwrap();
        room.add_member(a).await.unwrap();

        assert_eq!(room.usernames().await, vec!["alice", "bob"]);
        assert_eq!(room.member_count().await, 2);
    }
}
