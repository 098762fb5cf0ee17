use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::{AuthError, Identity, IdentityResolver, UpgradeRequest};
use crate::cluster::RoomDirectory;
use crate::dispatch::{DispatchError, TopicDispatchRegistry};
use crate::events::{EventPublisher, MembershipEvent};
use crate::metrics::{ConnectionMetrics, DirectoryMetrics, EventMetrics};
use crate::room::{RoomError, RoomManager};

use super::{Connection, OutboundMessage};

/// Reasons an upgrade is refused or a join fails
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket upgrade required")]
    UpgradeRequired,

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("{username} is already connected to {room}")]
    Conflict { room: String, username: String },

    #[error("room lookup failed: {0}")]
    Fatal(RoomError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UpgradeRequired => "upgrade_required",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict { .. } => "conflict",
            Self::Fatal(_) => "fatal",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::UpgradeRequired => "UPGRADE_REQUIRED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Fatal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        ConnectionMetrics::record_rejected(self.reason());

        let message = match &self {
            // Token details stay in the log
            Self::Unauthorized(e) => {
                tracing::warn!(error = %e, "WebSocket upgrade unauthorized");
                "Unauthorized".to_string()
            }
            Self::Fatal(e) => {
                tracing::error!(error = %e, "WebSocket upgrade failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

/// Admission, membership and frame handling for WebSocket connections
pub struct Gateway {
    rooms: Arc<RoomManager>,
    registry: Arc<TopicDispatchRegistry>,
    resolver: Arc<dyn IdentityResolver>,
    events: Arc<dyn EventPublisher>,
    directory: Arc<dyn RoomDirectory>,
}

impl Gateway {
    pub fn new(
        rooms: Arc<RoomManager>,
        registry: Arc<TopicDispatchRegistry>,
        resolver: Arc<dyn IdentityResolver>,
        events: Arc<dyn EventPublisher>,
        directory: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            rooms,
            registry,
            resolver,
            events,
            directory,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn registry(&self) -> &Arc<TopicDispatchRegistry> {
        &self.registry
    }

    /// Checks made before the socket is accepted: identity, then duplicate membership
    pub async fn authorize(&self, request: &UpgradeRequest) -> Result<Identity, GatewayError> {
        let identity = self.resolver.resolve(request).await?;

        match self.rooms.get_room(identity.room()) {
            Ok(room) => {
                if room.is_member_exists(identity.username()).await {
                    return Err(GatewayError::Conflict {
                        room: identity.room().to_string(),
                        username: identity.username().to_string(),
                    });
                }
            }
            // Created on join
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(GatewayError::Fatal(e)),
        }

        Ok(identity)
    }

    /// Add the connection to its room, creating the room if needed.
    ///
    /// Loses with `Conflict` if the same username joined since `authorize`.
    #[tracing::instrument(
        name = "ws.join",
        skip(self, identity, sender),
        fields(room_id = %identity.room(), username = %identity.username())
    )]
    pub async fn join(
        &self,
        identity: Identity,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<Connection>, GatewayError> {
        let room_id = identity.room().to_string();
        let reservation = self.rooms.reserve(&room_id);
        let conn = Arc::new(Connection::new(
            identity,
            Arc::clone(reservation.room()),
            sender,
        ));

        let added = reservation.add_member(conn.member()).await;
        drop(reservation);

        if let Err(e) = added {
            // The room may have been created for this join alone
            self.rooms.delete_room(&room_id);
            return Err(match e {
                RoomError::MemberAlreadyExists(username) => GatewayError::Conflict {
                    room: room_id,
                    username,
                },
                other => GatewayError::Fatal(other),
            });
        }

        ConnectionMetrics::record_opened();
        tracing::info!(connection_id = %conn.id, "Member joined room");

        self.publish(MembershipEvent::user_joined(&room_id, conn.username()))
            .await;

        if self.directory.is_enabled() {
            if let Err(e) = self.directory.register_room(&room_id).await {
                DirectoryMetrics::record_error("register");
                tracing::warn!(error = %e, "Failed to register room in directory");
            }
        }

        Ok(conn)
    }

    /// Remove the member, then the room if it is now empty.
    ///
    /// Both steps always run; failures are only logged. `UserLeft` and the
    /// close metrics are only emitted for the call that removed the member.
    #[tracing::instrument(
        name = "ws.leave",
        skip(self, conn),
        fields(
            connection_id = %conn.id,
            room_id = %conn.room_id(),
            username = %conn.username()
        )
    )]
    pub async fn leave(&self, conn: &Connection) {
        let room_id = conn.room_id();

        let removed = match conn.room().delete_member(conn.username()).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Member already removed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to remove member");
                false
            }
        };

        let room_deleted = self.rooms.delete_room(room_id);

        if removed {
            self.publish(MembershipEvent::user_left(room_id, conn.username()))
                .await;
        }

        if room_deleted && self.directory.is_enabled() {
            if let Err(e) = self.directory.unregister_room(room_id).await {
                DirectoryMetrics::record_error("unregister");
                tracing::warn!(error = %e, "Failed to unregister room from directory");
            }

            // A join may have recreated the room while we were unregistering
            if self.rooms.get_room(room_id).is_ok() {
                if let Err(e) = self.directory.register_room(room_id).await {
                    DirectoryMetrics::record_error("register");
                    tracing::warn!(error = %e, "Failed to re-register room in directory");
                }
            }
        }

        if !removed {
            return;
        }

        let duration = (chrono::Utc::now() - conn.connected_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        ConnectionMetrics::record_closed(duration);

        tracing::info!(room_deleted, duration_secs = duration, "Member left room");
    }

    /// Dispatch one text frame.
    ///
    /// Any failure is also reported to the client as an `error` frame; the
    /// connection stays open either way.
    pub async fn handle_text(&self, conn: &Arc<Connection>, text: &str) -> Result<(), DispatchError> {
        let result = self.registry.dispatch(conn, text).await;

        if let Err(ref e) = result {
            tracing::debug!(error = %e, connection_id = %conn.id, "Frame not handled");
            if let Err(send_err) = conn.send_error(e.to_string()) {
                tracing::warn!(error = %send_err, "Failed to report error to client");
            }
        }

        result
    }

    async fn publish(&self, event: MembershipEvent) {
        let name = event.name();
        match self.events.publish(event).await {
            Ok(()) => EventMetrics::record_published(name, true),
            Err(e) => {
                EventMetrics::record_published(name, false);
                tracing::warn!(error = %e, event = name, "Failed to publish membership event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::QueryIdentityResolver;
    use crate::cluster::LocalRoomDirectory;
    use crate::dispatch::register_builtin_handlers;
    use crate::events::{EventError, EventPublisher, LogEventPublisher, MembershipEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<MembershipEvent>>,
    }

    #[async_trait::async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: MembershipEvent) -> Result<(), EventError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn gateway() -> Gateway {
        let registry = Arc::new(TopicDispatchRegistry::new());
        register_builtin_handlers(&registry);
        Gateway::new(
            Arc::new(RoomManager::new()),
            registry,
            Arc::new(QueryIdentityResolver::new(None)),
            Arc::new(LogEventPublisher),
            Arc::new(LocalRoomDirectory::new("node-a".to_string())),
        )
    }

    fn request(room: &str, username: &str) -> UpgradeRequest {
        let mut request = UpgradeRequest::default();
        request.query.insert("room".to_string(), room.to_string());
        request
            .query
            .insert("username".to_string(), username.to_string());
        request
    }

    #[tokio::test]
    async fn test_authorize_rejects_missing_identity() {
        let gateway = gateway();
        let err = gateway
            .authorize(&UpgradeRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_join_then_duplicate_is_conflict() {
        let gateway = gateway();

        let identity = gateway.authorize(&request("shop1", "alice")).await.unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let conn = gateway.join(identity, tx).await.unwrap();
        assert_eq!(conn.room_id(), "shop1");

        let err = gateway
            .authorize(&request("shop1", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { .. }));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // Another user in the same room is fine
        assert!(gateway.authorize(&request("shop1", "bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_race_loser_leaves_no_trace() {
        let gateway = gateway();
        let first = gateway.authorize(&request("shop1", "alice")).await.unwrap();
        let second = gateway.authorize(&request("shop1", "alice")).await.unwrap();

        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let winner = gateway.join(first, tx1).await.unwrap();
        let err = gateway.join(second, tx2).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { ref username, .. } if username == "alice"));

        // The winner is untouched
        let room = gateway.rooms().get_room("shop1").unwrap();
        assert_eq!(room.member_count().await, 1);

        gateway.leave(&winner).await;
        assert!(gateway.rooms().get_room("shop1").is_err());
    }

    #[tokio::test]
    async fn test_leave_keeps_room_with_other_members() {
        let gateway = gateway();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);
        let alice = gateway
            .join(Identity::new("shop1", "alice").unwrap(), tx_a)
            .await
            .unwrap();
        let bob = gateway
            .join(Identity::new("shop1", "bob").unwrap(), tx_b)
            .await
            .unwrap();

        gateway.leave(&alice).await;
        let room = gateway.rooms().get_room("shop1").unwrap();
        assert_eq!(room.usernames().await, vec!["bob"]);

        gateway.leave(&bob).await;
        assert!(gateway.rooms().get_room("shop1").is_err());

        // Leaving twice is harmless
        gateway.leave(&bob).await;
    }

    #[tokio::test]
    async fn test_handle_text_reports_errors_to_client() {
        let gateway = gateway();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = gateway
            .join(Identity::new("shop1", "alice").unwrap(), tx)
            .await
            .unwrap();

        let err = gateway
            .handle_text(&conn, r#"{"topic":"unknown"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound(_)));

        let frame: serde_json::Value =
            serde_json::from_str(rx.recv().await.unwrap().as_str()).unwrap();
        assert_eq!(frame["topic"], "error");
        assert_eq!(
            frame["payload"]["message"],
            "no handler registered for topic: unknown"
        );

        // Still processing frames afterwards
        gateway
            .handle_text(&conn, r#"{"topic":"ping","payload":1}"#)
            .await
            .unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(rx.recv().await.unwrap().as_str()).unwrap();
        assert_eq!(frame["topic"], "pong");
    }

    #[tokio::test]
    async fn test_user_left_published_once_per_member() {
        let events = Arc::new(RecordingPublisher::default());
        let gateway = Gateway::new(
            Arc::new(RoomManager::new()),
            Arc::new(TopicDispatchRegistry::new()),
            Arc::new(QueryIdentityResolver::new(None)),
            events.clone(),
            Arc::new(LocalRoomDirectory::new("node-a".to_string())),
        );

        let (tx, _rx) = mpsc::channel(4);
        let alice = gateway
            .join(Identity::new("shop1", "alice").unwrap(), tx)
            .await
            .unwrap();

        gateway.leave(&alice).await;
        gateway.leave(&alice).await;

        let recorded = events.events.lock().unwrap().clone();
        let left: Vec<_> = recorded
            .iter()
            .filter(|e| matches!(e, MembershipEvent::UserLeft { .. }))
            .collect();
        assert_eq!(recorded.len(), 2);
        assert_eq!(left.len(), 1);
    }
}
