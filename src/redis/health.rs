use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

use super::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RedisHealthStatus {
    /// Cluster relay and Redis events are both off; Redis is never contacted
    Disabled = 0,
    Healthy = 1,
    Reconnecting = 2,
}

impl RedisHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisHealthStatus::Disabled => "disabled",
            RedisHealthStatus::Healthy => "healthy",
            RedisHealthStatus::Reconnecting => "reconnecting",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RedisHealthStatus::Disabled,
            1 => RedisHealthStatus::Healthy,
            _ => RedisHealthStatus::Reconnecting,
        }
    }
}

/// Connection state as seen by the relay subscriber and the command pool
pub struct RedisHealth {
    status: AtomicU8,
    last_connected: AtomicI64,
    reconnection_attempts: AtomicU32,
    total_reconnections: AtomicU32,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self::with_status(RedisHealthStatus::Reconnecting)
    }

    pub fn disabled() -> Self {
        Self::with_status(RedisHealthStatus::Disabled)
    }

    fn with_status(status: RedisHealthStatus) -> Self {
        Self {
            status: AtomicU8::new(status as u8),
            last_connected: AtomicI64::new(0),
            reconnection_attempts: AtomicU32::new(0),
            total_reconnections: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self) {
        let previous = self
            .status
            .swap(RedisHealthStatus::Healthy as u8, Ordering::AcqRel);
        self.last_connected.store(current_time_ms(), Ordering::Release);

        // The first connection is not a reconnection
        if previous == RedisHealthStatus::Reconnecting as u8
            && self.reconnection_attempts.load(Ordering::Acquire) > 0
        {
            self.total_reconnections.fetch_add(1, Ordering::AcqRel);
        }
        self.reconnection_attempts.store(0, Ordering::Release);
    }

    pub fn set_reconnecting(&self) {
        self.status
            .store(RedisHealthStatus::Reconnecting as u8, Ordering::Release);
        self.reconnection_attempts.fetch_add(1, Ordering::AcqRel);
    }

    pub fn status(&self) -> RedisHealthStatus {
        RedisHealthStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Healthy, or not in use at all
    pub fn is_ok(&self) -> bool {
        self.status() != RedisHealthStatus::Reconnecting
    }

    pub fn stats(&self) -> RedisHealthStats {
        RedisHealthStats {
            status: self.status(),
            last_connected_ms: self.last_connected.load(Ordering::Acquire),
            reconnection_attempts: self.reconnection_attempts.load(Ordering::Acquire),
            total_reconnections: self.total_reconnections.load(Ordering::Acquire),
        }
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedisHealthStats {
    pub status: RedisHealthStatus,
    pub last_connected_ms: i64,
    pub reconnection_attempts: u32,
    pub total_reconnections: u32,
}
