//! Prometheus metrics.
//!
//! - Connection metrics (opened/closed, duration, upgrade rejections)
//! - Room gauges (active rooms and members)
//! - Dispatch metrics (frames by outcome, handler latency)
//! - Delivery and relay metrics
//! - Redis and directory health

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DeliveryMetrics, DirectoryMetrics, DispatchMetrics,
    EventMetrics, HeartbeatMetrics, RelayMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "wireset";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections that joined a room"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections cleaned up"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "Lifetime of WebSocket connections in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Upgrade requests refused before the socket was accepted
    pub static ref WS_UPGRADE_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_upgrade_rejections_total", METRIC_PREFIX),
        "Upgrade requests rejected, by reason",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Room Metrics
    // ============================================================================

    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Rooms currently held by this instance"
    ).unwrap();

    pub static ref MEMBERS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_members_active", METRIC_PREFIX),
        "Room members currently connected to this instance"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    pub static ref FRAMES_DISPATCHED: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_dispatched_total", METRIC_PREFIX),
        "Inbound frames processed, by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref DISPATCH_LATENCY: Histogram = register_histogram!(
        format!("{}_dispatch_latency_seconds", METRIC_PREFIX),
        "Time from frame receipt until every handler finished",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Messages queued to member connections"
    ).unwrap();

    /// Per-member send failures (full buffer or closed connection)
    pub static ref SEND_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_send_failures_total", METRIC_PREFIX),
        "Per-member send failures, by reason",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    pub static ref RELAY_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_relay_published_total", METRIC_PREFIX),
        "Relay commands published to other instances, by mode",
        &["mode"]
    ).unwrap();

    pub static ref RELAY_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_received_total", METRIC_PREFIX),
        "Relay commands received from other instances"
    ).unwrap();

    /// Received commands for rooms this instance does not hold
    pub static ref RELAY_IGNORED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_ignored_total", METRIC_PREFIX),
        "Relay commands ignored because the room is not held here"
    ).unwrap();

    // ============================================================================
    // Directory / Redis Metrics
    // ============================================================================

    pub static ref CLUSTER_ENABLED: IntGauge = register_int_gauge!(
        format!("{}_cluster_enabled", METRIC_PREFIX),
        "Whether the room directory and relay are enabled (1) or not (0)"
    ).unwrap();

    pub static ref DIRECTORY_ROOMS_REFRESHED: IntCounter = register_int_counter!(
        format!("{}_directory_rooms_refreshed_total", METRIC_PREFIX),
        "Room directory entries refreshed by the heartbeat"
    ).unwrap();

    pub static ref DIRECTORY_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_directory_errors_total", METRIC_PREFIX),
        "Room directory operation failures",
        &["operation"]
    ).unwrap();

    /// 1 = connected, 0 = reconnecting or unused
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis relay subscriber connection status"
    ).unwrap();

    pub static ref REDIS_RECONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_redis_reconnections_total", METRIC_PREFIX),
        "Redis relay subscriber reconnection attempts"
    ).unwrap();

    // ============================================================================
    // Events / Heartbeat
    // ============================================================================

    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_published_total", METRIC_PREFIX),
        "Membership events published, by event and outcome",
        &["event", "outcome"]
    ).unwrap();

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Duration of one heartbeat round in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();
}
