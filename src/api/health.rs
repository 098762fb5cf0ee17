//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::cluster::DirectoryBackend;
use crate::redis::RedisHealthStatus;
use crate::room::RoomStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub redis: RedisHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub rooms: RoomStats,
    pub relay: RelayStats,
    pub redis: RedisStats,
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RelayStats {
    /// `local` or `redis`
    pub mode: DirectoryBackend,
    pub server_id: String,
}

#[derive(Debug, Serialize)]
pub struct RedisStats {
    pub status: String,
    pub reconnection_attempts: u32,
    pub total_reconnections: u32,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis_health = state.redis_health.stats();
    let status = if state.redis_health.is_ok() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        redis: RedisHealthResponse {
            status: redis_health.status.as_str().to_string(),
            connected: redis_health.status == RedisHealthStatus::Healthy,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let redis_health = state.redis_health.stats();

    let mut topics = state.registry.topics();
    topics.sort();

    Json(StatsResponse {
        rooms: state.rooms.stats().await,
        relay: RelayStats {
            mode: state.directory.backend_type(),
            server_id: state.relay.server_id().to_string(),
        },
        redis: RedisStats {
            status: redis_health.status.as_str().to_string(),
            reconnection_attempts: redis_health.reconnection_attempts,
            total_reconnections: redis_health.total_reconnections,
        },
        topics,
    })
}
