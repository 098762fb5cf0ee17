use std::sync::Arc;

use async_trait::async_trait;

use crate::websocket::{Connection, Payload};

use super::{HandlerError, TopicDispatchRegistry, WebsocketHandler};

pub const TOPIC_PING: &str = "ping";
pub const TOPIC_PONG: &str = "pong";

/// Answers `ping` with `pong`, echoing the payload
pub struct PingHandler;

#[async_trait]
impl WebsocketHandler for PingHandler {
    async fn handle(&self, conn: Arc<Connection>, payload: Payload) -> Result<(), HandlerError> {
        let echo: serde_json::Value = payload.decode()?;
        conn.reply(TOPIC_PONG, echo)?;
        Ok(())
    }
}

pub fn register_builtin_handlers(registry: &TopicDispatchRegistry) {
    registry.add_websocket_handler(TOPIC_PING, PingHandler);
}
