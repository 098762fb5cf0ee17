//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::room::{RoomError, RoomStats, SendError};

use super::{
    CLUSTER_ENABLED, DIRECTORY_ERRORS_TOTAL, DIRECTORY_ROOMS_REFRESHED, DISPATCH_LATENCY,
    EVENTS_PUBLISHED_TOTAL, FRAMES_DISPATCHED, HEARTBEAT_DURATION_MS, MEMBERS_ACTIVE,
    MESSAGES_DELIVERED_TOTAL, REDIS_CONNECTION_STATUS, REDIS_RECONNECTIONS_TOTAL,
    RELAY_IGNORED_TOTAL, RELAY_PUBLISHED_TOTAL, RELAY_RECEIVED_TOTAL, ROOMS_ACTIVE,
    SEND_FAILURES_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION,
    WS_UPGRADE_REJECTIONS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    /// `reason` is one of `upgrade_required`, `unauthorized`, `conflict`, `fatal`
    pub fn record_rejected(reason: &str) {
        WS_UPGRADE_REJECTIONS.with_label_values(&[reason]).inc();
    }

    pub fn set_room_stats(stats: &RoomStats) {
        ROOMS_ACTIVE.set(stats.total_rooms as i64);
        MEMBERS_ACTIVE.set(stats.total_members as i64);
    }
}

pub struct DispatchMetrics;

impl DispatchMetrics {
    /// `outcome` is one of `ok`, `handler_error`, `not_found`, `invalid`
    pub fn record_frame(outcome: &str, latency_secs: f64) {
        FRAMES_DISPATCHED.with_label_values(&[outcome]).inc();
        DISPATCH_LATENCY.observe(latency_secs);
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_delivered(count: usize) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count as u64);
    }

    /// Count every send failure in a broadcast or targeted send result
    pub fn record_failures(errors: &[RoomError]) {
        for error in errors {
            let reason = match error {
                RoomError::Send {
                    source: SendError::Full,
                    ..
                } => "full",
                RoomError::Send {
                    source: SendError::Closed,
                    ..
                } => "closed",
                _ => "other",
            };
            SEND_FAILURES_TOTAL.with_label_values(&[reason]).inc();
        }
    }
}

pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_targeted() {
        RELAY_PUBLISHED_TOTAL.with_label_values(&["targeted"]).inc();
    }

    pub fn record_broadcast() {
        RELAY_PUBLISHED_TOTAL.with_label_values(&["broadcast"]).inc();
    }

    pub fn record_received() {
        RELAY_RECEIVED_TOTAL.inc();
    }

    pub fn record_ignored() {
        RELAY_IGNORED_TOTAL.inc();
    }

    pub fn set_redis_connected(connected: bool) {
        REDIS_CONNECTION_STATUS.set(i64::from(connected));
    }

    pub fn record_reconnect() {
        REDIS_RECONNECTIONS_TOTAL.inc();
    }
}

pub struct DirectoryMetrics;

impl DirectoryMetrics {
    pub fn set_enabled(enabled: bool) {
        CLUSTER_ENABLED.set(i64::from(enabled));
    }

    pub fn record_refreshed(count: usize) {
        DIRECTORY_ROOMS_REFRESHED.inc_by(count as u64);
    }

    /// `operation` is one of `register`, `unregister`, `refresh`, `lookup`, `publish`
    pub fn record_error(operation: &str) {
        DIRECTORY_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}

pub struct EventMetrics;

impl EventMetrics {
    pub fn record_published(event: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[event, outcome])
            .inc();
    }
}

pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }
}
