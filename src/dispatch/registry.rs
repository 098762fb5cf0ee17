use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinSet;

use crate::metrics::DispatchMetrics;
use crate::websocket::{Connection, InboundFrame, Payload};

use super::{DispatchError, HandlerError, HandlerErrors};

/// Business logic bound to one topic.
///
/// The payload arrives undecoded; each handler decodes the shape it expects.
#[async_trait]
pub trait WebsocketHandler: Send + Sync {
    async fn handle(&self, conn: Arc<Connection>, payload: Payload) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a `WebsocketHandler`
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Arc<Connection>, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> WebsocketHandler for HandlerFn<F>
where
    F: Fn(Arc<Connection>, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, conn: Arc<Connection>, payload: Payload) -> Result<(), HandlerError> {
        (self.0)(conn, payload).await
    }
}

/// Topic to handlers mapping.
///
/// Registration is append-only. Every handler for a topic runs in its own
/// task; `handle` waits for all of them and reports every failure together.
#[derive(Default)]
pub struct TopicDispatchRegistry {
    handlers: DashMap<String, Vec<Arc<dyn WebsocketHandler>>>,
}

impl TopicDispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_websocket_handler(
        &self,
        topic: impl Into<String>,
        handler: impl WebsocketHandler + 'static,
    ) {
        let topic = topic.into();
        tracing::debug!(topic = %topic, "Websocket handler registered");
        self.handlers
            .entry(topic)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.get(topic).map_or(0, |h| h.len())
    }

    /// Parse a text frame and dispatch it
    pub async fn dispatch(&self, conn: &Arc<Connection>, text: &str) -> Result<(), DispatchError> {
        let started = Instant::now();

        let result = match InboundFrame::parse(text) {
            Ok(frame) => self.handle(&frame.topic, conn, frame.payload).await,
            Err(e) => Err(e.into()),
        };

        let outcome = match &result {
            Ok(()) => "ok",
            Err(e) => e.outcome(),
        };
        DispatchMetrics::record_frame(outcome, started.elapsed().as_secs_f64());
        result
    }

    #[tracing::instrument(
        name = "ws.dispatch",
        skip(self, conn, payload),
        fields(room_id = %conn.room_id(), username = %conn.username())
    )]
    pub async fn handle(
        &self,
        topic: &str,
        conn: &Arc<Connection>,
        payload: Payload,
    ) -> Result<(), DispatchError> {
        // Clone out so no shard lock is held across the awaits below
        let handlers = match self.handlers.get(topic) {
            Some(handlers) if !handlers.is_empty() => handlers.value().clone(),
            _ => return Err(DispatchError::HandlerNotFound(topic.to_string())),
        };

        let mut tasks = JoinSet::new();
        for handler in handlers {
            let conn = Arc::clone(conn);
            let payload = payload.clone();
            tasks.spawn(async move { handler.handle(conn, payload).await });
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Websocket handler failed");
                    errors.push(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Websocket handler panicked");
                    errors.push(HandlerError::Panicked(e.to_string()));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Handlers(HandlerErrors(errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::room::Room;
    use crate::websocket::OutboundMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn connection() -> (Arc<Connection>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new(
            Identity::new("shop1", "alice").unwrap(),
            Arc::new(Room::new("shop1")),
            tx,
        );
        (Arc::new(conn), rx)
    }

    fn counting(counter: &Arc<AtomicUsize>, fail: bool) -> impl WebsocketHandler {
        let counter = Arc::clone(counter);
        handler_fn(move |_conn, _payload| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(HandlerError::Other(anyhow::anyhow!("nope")))
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test]
    async fn test_all_handlers_run_and_errors_aggregate() {
        let registry = TopicDispatchRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.add_websocket_handler("ping", counting(&counter, false));
        registry.add_websocket_handler("ping", counting(&counter, true));
        assert_eq!(registry.handler_count("ping"), 2);

        let (conn, _rx) = connection();
        let err = registry
            .handle("ping", &conn, Payload::default())
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        match err {
            DispatchError::Handlers(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.to_string(), "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let registry = TopicDispatchRegistry::new();
        let (conn, _rx) = connection();

        let err = registry
            .handle("unknown", &conn, Payload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound(ref t) if t == "unknown"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported() {
        let registry = TopicDispatchRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.add_websocket_handler(
            "boom",
            handler_fn(|_conn, _payload| async move {
                if true {
                    panic!("handler exploded");
                }
                Ok::<(), HandlerError>(())
            }),
        );
        registry.add_websocket_handler("boom", counting(&counter, false));

        let (conn, _rx) = connection();
        let err = registry
            .handle("boom", &conn, Payload::default())
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        match err {
            DispatchError::Handlers(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors.0[0], HandlerError::Panicked(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_parses_and_decodes_payload() {
        let registry = TopicDispatchRegistry::new();
        registry.add_websocket_handler(
            "add",
            handler_fn(|conn: Arc<Connection>, payload: Payload| async move {
                let numbers: Vec<i64> = payload.decode()?;
                conn.reply("sum", numbers.iter().sum::<i64>())?;
                Ok::<(), HandlerError>(())
            }),
        );

        let (conn, mut rx) = connection();
        registry
            .dispatch(&conn, r#"{"topic":"add","payload":[1,2,3]}"#)
            .await
            .unwrap();

        let reply: serde_json::Value =
            serde_json::from_str(rx.recv().await.unwrap().as_str()).unwrap();
        assert_eq!(reply["topic"], "sum");
        assert_eq!(reply["payload"], 6);

        let err = registry
            .dispatch(&conn, r#"{"topic":"add","payload":"x"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handlers(_)));

        let err = registry.dispatch(&conn, r#"{"payload":1}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidFrame(_)));
    }
}
