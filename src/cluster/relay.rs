//! Cross-instance delivery of deliver-to-room commands.
//!
//! Delivery is local first. With the directory enabled, the command is then
//! published to every other instance the directory lists for the room; if
//! the lookup fails it is broadcast to all instances, each of which delivers
//! only when it holds the room.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::metrics::{DeliveryMetrics, RelayMetrics};
use crate::redis::{ExponentialBackoff, RedisPool};
use crate::room::{RoomError, RoomManager};
use crate::websocket::{OutboundMessage, WebsocketMessage};

use super::traits::RoomDirectory;
use super::types::{server_channel, ClusterConfig, RelayMessage};

/// "Send this message to room X" (optionally to one member of X)
#[derive(Debug, Clone)]
pub struct DeliverToRoom {
    pub room_id: String,
    pub username: Option<String>,
    pub message: OutboundMessage,
}

impl DeliverToRoom {
    pub fn new<T: Serialize>(
        room_id: impl Into<String>,
        message: &WebsocketMessage<T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            room_id: room_id.into(),
            username: None,
            message: OutboundMessage::encode(message)?,
        })
    }

    pub fn to_member(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Outcome of one `deliver_to_room` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayResult {
    /// Members on this instance the message was queued to
    pub local_delivered: usize,
    /// Members on this instance whose send failed
    pub local_failed: usize,
    /// Other instances the command was published to
    pub routed_to_servers: usize,
    /// Whether the command fell back to an all-instance broadcast
    pub broadcast: bool,
}

pub struct RoomRelay {
    rooms: Arc<RoomManager>,
    directory: Arc<dyn RoomDirectory>,
}

impl RoomRelay {
    pub fn new(rooms: Arc<RoomManager>, directory: Arc<dyn RoomDirectory>) -> Self {
        Self { rooms, directory }
    }

    pub fn server_id(&self) -> &str {
        self.directory.server_id()
    }

    pub fn is_cluster_enabled(&self) -> bool {
        self.directory.is_enabled()
    }

    #[tracing::instrument(
        name = "relay.deliver",
        skip(self, command),
        fields(room_id = %command.room_id, username = ?command.username)
    )]
    pub async fn deliver_to_room(&self, command: DeliverToRoom) -> RelayResult {
        let mut result = RelayResult::default();

        let (delivered, failed) = self.deliver_locally(&command).await;
        result.local_delivered = delivered;
        result.local_failed = failed;

        // A single recipient already reached here needs no routing
        let reached_member = command.username.is_some() && delivered > 0;
        if !self.directory.is_enabled() || reached_member {
            return result;
        }

        let mut relay = RelayMessage {
            room_id: command.room_id.clone(),
            username: command.username.clone(),
            message: command.message.as_str().to_string(),
            from_server: self.directory.server_id().to_string(),
            to_server: None,
        };

        match self.directory.find_room_servers(&command.room_id).await {
            Ok(servers) => {
                for server in servers
                    .into_iter()
                    .filter(|s| s != self.directory.server_id())
                {
                    relay.to_server = Some(server.clone());
                    match self.directory.publish_relay(&relay).await {
                        Ok(()) => {
                            RelayMetrics::record_targeted();
                            result.routed_to_servers += 1;
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                target_server = %server,
                                "Failed to route message to server"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Room directory lookup failed, broadcasting");

                match self.directory.publish_relay(&relay).await {
                    Ok(()) => {
                        RelayMetrics::record_broadcast();
                        result.broadcast = true;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to broadcast relay message");
                    }
                }
            }
        }

        result
    }

    /// Deliver a command received from another instance.
    ///
    /// Returns the number of local members reached. Commands targeted at a
    /// different instance, sent by this instance, or for a room this
    /// instance does not hold are no-ops.
    pub async fn handle_relay_message(&self, message: RelayMessage) -> usize {
        let own_id = self.directory.server_id();

        if message.from_server == own_id {
            return 0;
        }
        if let Some(ref target) = message.to_server {
            if target != own_id {
                return 0;
            }
        }

        RelayMetrics::record_received();

        let command = DeliverToRoom {
            room_id: message.room_id,
            username: message.username,
            message: OutboundMessage::from_json(message.message),
        };
        let (delivered, _) = self.deliver_locally(&command).await;

        tracing::debug!(
            from_server = %message.from_server,
            room_id = %command.room_id,
            delivered,
            "Handled relay message"
        );
        delivered
    }

    async fn deliver_locally(&self, command: &DeliverToRoom) -> (usize, usize) {
        let room = match self.rooms.get_room(&command.room_id) {
            Ok(room) => room,
            Err(_) => {
                RelayMetrics::record_ignored();
                return (0, 0);
            }
        };

        match &command.username {
            Some(username) => {
                match room
                    .send_encoded_to(username, command.message.clone())
                    .await
                {
                    Ok(()) => {
                        DeliveryMetrics::record_delivered(1);
                        (1, 0)
                    }
                    Err(e @ RoomError::MemberNotFound(_)) => {
                        tracing::debug!(error = %e, "Member not held by this instance");
                        (0, 0)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to deliver to member");
                        DeliveryMetrics::record_failures(std::slice::from_ref(&e));
                        (0, 1)
                    }
                }
            }
            None => {
                let members = room.member_count().await;
                let errors = room.broadcast_encoded(&command.message).await;
                for e in &errors {
                    tracing::warn!(error = %e, "Broadcast send failed");
                }
                DeliveryMetrics::record_failures(&errors);

                let delivered = members.saturating_sub(errors.len());
                DeliveryMetrics::record_delivered(delivered);
                (delivered, errors.len())
            }
        }
    }
}

/// Background task receiving relay commands addressed to this instance
pub struct RelaySubscriber {
    config: ClusterConfig,
    redis_pool: Arc<RedisPool>,
    relay: Arc<RoomRelay>,
    shutdown: broadcast::Receiver<()>,
}

impl RelaySubscriber {
    pub fn new(
        config: ClusterConfig,
        redis_pool: Arc<RedisPool>,
        relay: Arc<RoomRelay>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            redis_pool,
            relay,
            shutdown,
        }
    }

    /// Run the subscriber task with automatic reconnection
    pub async fn run(mut self) {
        if !self.config.enabled {
            tracing::info!("Cluster mode disabled, relay subscriber not starting");
            return;
        }

        tracing::info!(
            server_id = %self.config.server_id,
            routing_channel = %self.config.routing_channel,
            "Relay subscriber starting"
        );

        let mut backoff = ExponentialBackoff::default();

        loop {
            match self.run_subscription_loop(&mut backoff).await {
                Ok(()) => {
                    tracing::info!("Relay subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    self.redis_pool.health().set_reconnecting();
                    RelayMetrics::set_redis_connected(false);
                    RelayMetrics::record_reconnect();

                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        retry_delay_ms = delay.as_millis() as u64,
                        "Relay subscription error, reconnecting"
                    );

                    tokio::select! {
                        _ = self.shutdown.recv() => {
                            tracing::info!("Shutdown requested during reconnect delay");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn run_subscription_loop(
        &mut self,
        backoff: &mut ExponentialBackoff,
    ) -> anyhow::Result<()> {
        let mut pubsub = self.redis_pool.pubsub().await?;

        let own_channel = server_channel(&self.config.routing_channel, &self.config.server_id);
        pubsub.subscribe(&own_channel).await?;
        pubsub.subscribe(&self.config.routing_channel).await?;

        self.redis_pool.health().set_connected();
        RelayMetrics::set_redis_connected(true);
        backoff.reset();

        tracing::info!(
            server_channel = %own_channel,
            broadcast_channel = %self.config.routing_channel,
            "Subscribed to relay channels"
        );

        let mut messages = pubsub.on_message();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }

                msg = messages.next() => {
                    let Some(msg) = msg else {
                        anyhow::bail!("relay message stream ended");
                    };

                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to get relay payload");
                            continue;
                        }
                    };

                    match serde_json::from_str::<RelayMessage>(&payload) {
                        Ok(message) => {
                            self.relay.handle_relay_message(message).await;
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                channel = %msg.get_channel_name(),
                                "Failed to parse relay message"
                            );
                        }
                    }
                }
            }
        }
    }
}
