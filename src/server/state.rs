use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::auth::{create_identity_resolver, IdentityResolver};
use crate::cluster::{create_room_directory, RoomDirectory, RoomRelay};
use crate::config::Settings;
use crate::dispatch::{register_builtin_handlers, TopicDispatchRegistry};
use crate::error::AppError;
use crate::events::create_event_publisher;
use crate::metrics::DirectoryMetrics;
use crate::redis::{RedisHealth, RedisPool};
use crate::room::RoomManager;
use crate::websocket::Gateway;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub rooms: Arc<RoomManager>,
    pub registry: Arc<TopicDispatchRegistry>,
    pub gateway: Arc<Gateway>,
    pub relay: Arc<RoomRelay>,
    pub directory: Arc<dyn RoomDirectory>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub redis_health: Arc<RedisHealth>,
    pub shutdown: broadcast::Sender<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let resolver = create_identity_resolver(&settings.auth)?;
        Self::with_resolver(settings, resolver)
    }

    /// Build the state with a caller-supplied identity resolver
    pub fn with_resolver(
        settings: Settings,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self, AppError> {
        // Redis is only touched when something needs it; the connection
        // itself is opened lazily on first use.
        let (redis_pool, redis_health) = if settings.cluster.enabled || settings.events.enabled {
            let health = Arc::new(RedisHealth::new());
            let pool = RedisPool::new(settings.redis.clone(), Arc::clone(&health))?;
            (Some(Arc::new(pool)), health)
        } else {
            (None, Arc::new(RedisHealth::disabled()))
        };

        let rooms = Arc::new(RoomManager::new());

        let registry = Arc::new(TopicDispatchRegistry::new());
        register_builtin_handlers(&registry);

        let directory = create_room_directory(&settings.cluster, redis_pool.clone());
        DirectoryMetrics::set_enabled(directory.is_enabled());

        let events = create_event_publisher(&settings.events, redis_pool.clone());

        let gateway = Arc::new(Gateway::new(
            Arc::clone(&rooms),
            Arc::clone(&registry),
            resolver,
            events,
            Arc::clone(&directory),
        ));

        let relay = Arc::new(RoomRelay::new(Arc::clone(&rooms), Arc::clone(&directory)));

        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            settings: Arc::new(settings),
            rooms,
            registry,
            gateway,
            relay,
            directory,
            redis_pool,
            redis_health,
            shutdown,
            start_time: Instant::now(),
        })
    }
}
