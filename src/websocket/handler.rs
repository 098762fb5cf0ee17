use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;

use crate::auth::{Identity, UpgradeRequest};
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;

use super::{Connection, GatewayError, OutboundMessage, WebsocketMessage};

/// How long the writer may keep draining queued frames after the read loop ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip_all)]
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Not a WebSocket upgrade request");
            return GatewayError::UpgradeRequired.into_response();
        }
    };

    let request = UpgradeRequest::new(headers, query);
    let identity = match state.gateway.authorize(&request).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    tracing::info!(
        room_id = %identity.room(),
        username = %identity.username(),
        "WebSocket upgrade accepted"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, identity),
    fields(
        room_id = %identity.room(),
        username = %identity.username(),
        otel.kind = "server"
    )
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (tx, rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size);
    let (mut ws_sender, ws_receiver) = socket.split();

    // Subscribed before joining so a shutdown racing the join is still seen
    let mut shutdown_rx = state.shutdown.subscribe();

    let conn = match state.gateway.join(identity, tx).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Join rejected after upgrade");
            reject(&mut ws_sender, &e).await;
            return;
        }
    };
    let connection_id = conn.id;

    let send_timeout = Duration::from_millis(state.settings.websocket.send_timeout_ms);
    let mut send_task = tokio::spawn(write_loop(ws_sender, rx, send_timeout));

    let recv_state = state.clone();
    let recv_conn = Arc::clone(&conn);
    let mut recv_task =
        tokio::spawn(async move { read_loop(ws_receiver, &recv_state, &recv_conn).await });

    let mut writer_done = false;

    tokio::select! {
        _ = &mut send_task => {
            writer_done = true;
            recv_task.abort();
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = shutdown_rx.recv() => {
            recv_task.abort();
            tracing::debug!(connection_id = %connection_id, "Shutdown signal received");
        }
    }

    state.gateway.leave(&conn).await;
    drop(conn);

    // The writer exits once every sender is gone, flushing what is queued
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}

async fn read_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    state: &AppState,
    conn: &Arc<Connection>,
) {
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // Failures are reported to the client inside handle_text
                let _ = state.gateway.handle_text(conn, text.as_str()).await;
            }
            Ok(Message::Binary(_)) => {
                if let Err(e) = conn.send_error("binary frames are not supported") {
                    tracing::warn!(error = %e, "Failed to report error to client");
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %conn.id, "Received close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(connection_id = %conn.id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
    send_timeout: Duration,
) {
    while let Some(msg) = rx.recv().await {
        let frame = Message::Text(msg.as_str().to_owned().into());
        match tokio::time::timeout(send_timeout, ws_sender.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket send failed");
                return;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = send_timeout.as_millis() as u64,
                    "WebSocket write stalled, dropping connection"
                );
                return;
            }
        }
    }

    let _ = ws_sender.close().await;
}

/// Report a post-upgrade join failure over the socket, then close it
async fn reject(ws_sender: &mut SplitSink<WebSocket, Message>, error: &GatewayError) {
    ConnectionMetrics::record_rejected(error.reason());

    if let Ok(json) = serde_json::to_string(&WebsocketMessage::error(error.to_string())) {
        let _ = ws_sender.send(Message::Text(json.into())).await;
    }
    let _ = ws_sender.close().await;
}
