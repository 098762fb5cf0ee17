mod settings;

pub use settings::{
    ApiConfig, AuthConfig, AuthMode, ClusterConfig, EventsConfig, JwtConfig, LoggingConfig,
    OtelConfig, RedisConfig, ServerConfig, Settings, WebSocketConfig,
};
