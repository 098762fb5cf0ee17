//! Graceful shutdown handling.
//!
//! Shutdown runs in three phases:
//! 1. Every member of every room receives a `server_shutdown` system message
//! 2. The shared shutdown signal stops read loops and background tasks
//! 3. We wait (bounded) for connections to finish cleanup and rooms to empty

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::room::RoomManager;
use crate::websocket::WebsocketMessage;

/// Topic of the notice sent to clients before the server goes away
pub const TOPIC_SERVER_SHUTDOWN: &str = "server_shutdown";

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for connections to clean up (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Suggested reconnect delay to send to clients (default: 5 seconds)
    pub reconnect_after_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            reconnect_after_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownNotice {
    pub reason: String,
    pub reconnect_after_seconds: u64,
}

pub struct GracefulShutdown {
    rooms: Arc<RoomManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(rooms: Arc<RoomManager>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(rooms, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        rooms: Arc<RoomManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            rooms,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(name = "graceful_shutdown", skip(self), fields(rooms = self.rooms.len()))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.members_notified = self.notify_members(reason).await;

        tracing::info!("Phase 2: Signaling connections and background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for rooms to drain");
        result.rooms_remaining = self.wait_for_rooms_to_drain().await;

        result.duration = start.elapsed();
        result.success = result.rooms_remaining == 0;

        tracing::info!(
            members_notified = result.members_notified,
            rooms_remaining = result.rooms_remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_members(&self, reason: &str) -> usize {
        let message = WebsocketMessage::new(
            TOPIC_SERVER_SHUTDOWN,
            ShutdownNotice {
                reason: reason.to_string(),
                reconnect_after_seconds: self.config.reconnect_after_seconds,
            },
        )
        .from_system();

        let mut notified = 0;
        for room in self.rooms.rooms() {
            let total = room.member_count().await;
            let failures = room.broadcast_message(&message).await;
            for e in &failures {
                tracing::debug!(room_id = %room.id(), error = %e, "Failed to send shutdown notice");
            }
            notified += total.saturating_sub(failures.len());
        }

        notified
    }

    async fn wait_for_rooms_to_drain(&self) -> usize {
        let wait = async {
            while !self.rooms.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait).await;

        let remaining = self.rooms.len();
        if remaining > 0 {
            tracing::warn!(remaining_rooms = remaining, "Some rooms did not drain before shutdown");
        }
        remaining
    }
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every room drained
    pub success: bool,
    pub members_notified: usize,
    pub rooms_remaining: usize,
    pub duration: Duration,
}

/// Resolves on Ctrl+C or SIGTERM with a description of the signal
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "interrupted"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "terminated"
        }
    }
}
