//! Redis plumbing shared by the room directory, the relay and the event bus.

mod backoff;
mod health;
mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use health::{RedisHealth, RedisHealthStats, RedisHealthStatus};
pub use pool::{PoolError, RedisPool};

/// Current time in milliseconds since epoch
fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
