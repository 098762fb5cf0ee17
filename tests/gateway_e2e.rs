//! End-to-end tests: the full axum app on an ephemeral port, driven by a
//! real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;

use async_trait::async_trait;
use tokio::sync::broadcast;

use wireset_realtime::auth::QueryIdentityResolver;
use wireset_realtime::config::Settings;
use wireset_realtime::events::{EventError, EventPublisher, MembershipEvent};
use wireset_realtime::server::{create_app, AppState};
use wireset_realtime::websocket::Gateway;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(settings: Settings) -> (String, AppState) {
    let state = AppState::with_resolver(settings, Arc::new(QueryIdentityResolver::new(None)))
        .expect("state should build without Redis");
    serve(state).await
}

async fn serve(state: AppState) -> (String, AppState) {
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr.to_string(), state)
}

fn ws_url(addr: &str, room: &str, username: &str) -> String {
    format!("ws://{}/api/v1/ws?room={}&username={}", addr, room, username)
}

/// Connect and wait until the server has added the member to its room
async fn connect(addr: &str, state: &AppState, room: &str, username: &str) -> Client {
    let (client, _) = tokio_test::assert_ok!(connect_async(ws_url(addr, room, username)).await);

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(joined) = state.rooms.get_room(room) {
                if joined.is_member_exists(username).await {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("member should join");

    client
}

fn expect_http_status(result: Result<impl Sized, WsError>, expected: StatusCode) {
    match result {
        Ok(_) => panic!("upgrade should have been refused with {expected}"),
        Err(WsError::Http(response)) => assert_eq!(response.status(), expected),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

async fn next_json(client: &mut Client) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("read error");

    match frame {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn wait_until_room_gone(state: &AppState, room: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.rooms.get_room(room).is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("room should be removed after disconnect");
}

#[tokio::test]
async fn test_ping_round_trip() {
    let (addr, state) = start_server(Settings::default()).await;
    let mut client = connect(&addr, &state, "shop1", "alice").await;

    send_json(&mut client, json!({"topic": "ping", "payload": {"seq": 1}})).await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["topic"], "pong");
    assert_eq!(reply["payload"]["seq"], 1);
}

#[tokio::test]
async fn test_unknown_topic_reports_error_and_keeps_connection() {
    let (addr, state) = start_server(Settings::default()).await;
    let mut client = connect(&addr, &state, "shop1", "alice").await;

    send_json(&mut client, json!({"topic": "unknown", "payload": null})).await;
    let error = next_json(&mut client).await;
    assert_eq!(error["topic"], "error");
    assert_eq!(
        error["payload"]["message"],
        "no handler registered for topic: unknown"
    );

    client
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await["topic"], "error");

    send_json(&mut client, json!({"topic": "ping", "payload": 2})).await;
    assert_eq!(next_json(&mut client).await["topic"], "pong");
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let (addr, state) = start_server(Settings::default()).await;
    let _alice = connect(&addr, &state, "shop1", "alice").await;

    expect_http_status(
        connect_async(ws_url(&addr, "shop1", "alice")).await,
        StatusCode::CONFLICT,
    );

    // Same username in another room is a different member
    let _other = connect(&addr, &state, "shop2", "alice").await;
    assert_eq!(
        state.rooms.get_room("shop1").unwrap().usernames().await,
        vec!["alice"]
    );
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (addr, _state) = start_server(Settings::default()).await;

    expect_http_status(
        connect_async(format!("ws://{}/api/v1/ws?room=shop1", addr)).await,
        StatusCode::UNAUTHORIZED,
    );
}

#[tokio::test]
async fn test_plain_http_request_gets_upgrade_required() {
    let (addr, _state) = start_server(Settings::default()).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(
            b"GET /api/v1/ws?room=shop1&username=alice HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(
        response.starts_with("HTTP/1.1 426"),
        "unexpected response: {response}"
    );
}

#[tokio::test]
async fn test_room_removed_after_disconnect() {
    let (addr, state) = start_server(Settings::default()).await;

    let mut alice = connect(&addr, &state, "shop1", "alice").await;
    let mut bob = connect(&addr, &state, "shop1", "bob").await;
    assert_eq!(state.rooms.get_room("shop1").unwrap().member_count().await, 2);

    alice.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.rooms.get_room("shop1").unwrap().member_count().await != 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("alice should be removed");

    bob.close(None).await.unwrap();
    wait_until_room_gone(&state, "shop1").await;

    // The same username may join again once it has left
    let _alice = connect(&addr, &state, "shop1", "alice").await;
}

#[tokio::test]
async fn test_http_command_reaches_room_members() {
    let (addr, state) = start_server(Settings::default()).await;
    let mut alice = connect(&addr, &state, "shop1", "alice").await;
    let mut bob = connect(&addr, &state, "shop1", "bob").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/rooms/shop1/messages")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"topic": "order", "payload": {"id": 42}}).to_string(),
        ))
        .unwrap();
    let response = create_app(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let result: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(result["local_delivered"], 2);

    for client in [&mut alice, &mut bob] {
        let frame = next_json(client).await;
        assert_eq!(frame["topic"], "order");
        assert_eq!(frame["payload"]["id"], 42);
    }
}

#[tokio::test]
async fn test_http_command_requires_configured_api_key() {
    let mut settings = Settings::default();
    settings.api.key = Some("secret".to_string());
    let (_addr, state) = start_server(settings).await;

    let request = |key: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/rooms/shop1/messages")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder
            .body(Body::from(json!({"topic": "order"}).to_string()))
            .unwrap()
    };

    let app = create_app(state);
    let denied = app.clone().oneshot(request(None)).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app.oneshot(request(Some("secret"))).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::ACCEPTED);
}

/// Fires the shutdown signal while a join is still in progress
struct ShutdownOnJoin {
    shutdown: broadcast::Sender<()>,
}

#[async_trait]
impl EventPublisher for ShutdownOnJoin {
    async fn publish(&self, event: MembershipEvent) -> Result<(), EventError> {
        if matches!(event, MembershipEvent::UserJoined { .. }) {
            let _ = self.shutdown.send(());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_during_join_still_closes_connection() {
    let mut state = AppState::with_resolver(
        Settings::default(),
        Arc::new(QueryIdentityResolver::new(None)),
    )
    .unwrap();
    state.gateway = Arc::new(Gateway::new(
        state.rooms.clone(),
        state.registry.clone(),
        Arc::new(QueryIdentityResolver::new(None)),
        Arc::new(ShutdownOnJoin {
            shutdown: state.shutdown.clone(),
        }),
        state.directory.clone(),
    ));
    let (addr, state) = serve(state).await;

    let (mut client, _) = tokio_test::assert_ok!(connect_async(ws_url(&addr, "shop1", "alice")).await);

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection should be closed by the server");
    wait_until_room_gone(&state, "shop1").await;
}
