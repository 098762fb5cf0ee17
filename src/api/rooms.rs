//! Room inspection and the deliver-to-room command endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::{DeliverToRoom, RelayResult};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::websocket::WebsocketMessage;

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room_id: String,
    pub members: Vec<String>,
    pub member_count: usize,
}

/// Body of `POST /api/v1/rooms/{room}/messages`
#[derive(Debug, Deserialize)]
pub struct RoomMessageRequest {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
    /// Deliver to this member only
    #[serde(default)]
    pub username: Option<String>,
}

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<RoomListResponse> {
    let mut rooms = state.rooms.room_keys();
    rooms.sort();

    Json(RoomListResponse {
        total: rooms.len(),
        rooms,
    })
}

/// GET /api/v1/rooms/{room}
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>> {
    let room = state.rooms.get_room(&room_id)?;
    let members = room.usernames().await;

    Ok(Json(RoomResponse {
        room_id,
        member_count: members.len(),
        members,
    }))
}

/// POST /api/v1/rooms/{room}/messages
#[tracing::instrument(
    name = "api.room_message",
    skip(state, request),
    fields(topic = %request.topic, username = ?request.username)
)]
pub async fn send_room_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<RoomMessageRequest>,
) -> Result<(StatusCode, Json<RelayResult>)> {
    if request.topic.trim().is_empty() {
        return Err(AppError::Validation("topic must not be empty".to_string()));
    }

    let message = WebsocketMessage::new(request.topic, request.payload);
    let mut command = DeliverToRoom::new(room_id, &message)
        .map_err(|e| AppError::Internal(format!("failed to encode message: {}", e)))?;
    if let Some(username) = request.username.filter(|u| !u.is_empty()) {
        command = command.to_member(username);
    }

    let result = state.relay.deliver_to_room(command).await;

    Ok((StatusCode::ACCEPTED, Json(result)))
}
