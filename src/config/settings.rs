use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the WebSocket upgrade endpoint
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Bearer or `?token=` JWT carrying the room and username claims
    Jwt,
    /// `?room=&username=` query parameters; development only
    Query,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_mode")]
    pub mode: AuthMode,
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Username used by the query resolver when none is supplied
    #[serde(default)]
    pub default_username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret; JWT mode refuses to start when it is missing or short
    #[serde(default)]
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Required in `X-API-Key` on the command endpoints when set
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Capacity of each connection's outbound channel
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    /// A socket write taking longer than this drops the connection
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Directory refresh and gauge update interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Unique id of this instance; generated when absent
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default = "default_directory_prefix")]
    pub directory_prefix: String,
    /// Lifetime of a room's directory entry without a refresh
    #[serde(default = "default_directory_ttl_seconds")]
    pub directory_ttl_seconds: u64,
    /// Base pub/sub channel; targeted commands go to `{routing_channel}:{server_id}`
    #[serde(default = "default_routing_channel")]
    pub routing_channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Publish membership events to Redis instead of only logging them
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_events_channel")]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_ws_path() -> String {
    "/api/v1/ws".to_string()
}

fn default_auth_mode() -> AuthMode {
    AuthMode::Jwt
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel_buffer_size() -> usize {
    32
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_server_id() -> String {
    format!("wireset-{}", uuid::Uuid::new_v4())
}

fn default_directory_prefix() -> String {
    "wireset".to_string()
}

fn default_directory_ttl_seconds() -> u64 {
    90
}

fn default_routing_channel() -> String {
    "wireset:relay".to_string()
}

fn default_events_channel() -> String {
    "wireset:events".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "wireset-realtime".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("server.ws_path", default_ws_path())?
            .set_default("redis.url", default_redis_url())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APP_SERVER__PORT, APP_AUTH__JWT__SECRET, APP_CLUSTER__SERVER_ID, ...
            // Double underscore keeps keys like `ws_path` addressable.
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            websocket: WebSocketConfig::default(),
            cluster: ClusterConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            cors_origins: vec![],
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            jwt: JwtConfig::default(),
            default_username: None,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
            send_timeout_ms: default_send_timeout_ms(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_id: default_server_id(),
            directory_prefix: default_directory_prefix(),
            directory_ttl_seconds: default_directory_ttl_seconds(),
            routing_channel: default_routing_channel(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: default_events_channel(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
