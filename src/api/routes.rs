use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::rooms::{get_room, list_rooms, send_room_message};

pub fn api_routes(state: AppState) -> Router<AppState> {
    // Command ingress requires the API key when one is configured
    let commands = Router::new()
        .route("/rooms/{room}/messages", post(send_room_message))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/rooms", get(list_rooms))
                .route("/rooms/{room}", get(get_room))
                .merge(commands),
        )
}
