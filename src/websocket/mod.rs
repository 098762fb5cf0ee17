//! WebSocket surface: wire envelope, per-connection state, admission and
//! the upgrade handler.

mod connection;
mod gateway;
mod handler;
mod message;

pub use connection::Connection;
pub use gateway::{Gateway, GatewayError};
pub use handler::ws_handler;
pub use message::{
    ErrorPayload, FrameError, InboundFrame, OutboundMessage, Payload, WebsocketMessage,
    SYSTEM_SENDER, TOPIC_ERROR,
};
