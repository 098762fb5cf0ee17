//! Topic-keyed dispatch of inbound frames.

mod error;
mod handlers;
mod registry;

pub use error::{DispatchError, HandlerError, HandlerErrors};
pub use handlers::{register_builtin_handlers, PingHandler, TOPIC_PING, TOPIC_PONG};
pub use registry::{handler_fn, HandlerFn, TopicDispatchRegistry, WebsocketHandler};
