//! Cluster support: the shared room directory and cross-instance relay.

mod factory;
mod local;
mod redis_store;
mod relay;
mod traits;
mod types;

pub use factory::create_room_directory;
pub use local::LocalRoomDirectory;
pub use redis_store::RedisRoomDirectory;
pub use relay::{DeliverToRoom, RelayResult, RelaySubscriber, RoomRelay};
pub use traits::RoomDirectory;
pub use types::{server_channel, ClusterConfig, DirectoryBackend, DirectoryError, RelayMessage};
