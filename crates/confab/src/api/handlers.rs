//! API request handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::error::ApiResult;
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Relay diagnostics snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Live WebSocket connections.
    pub connections: usize,
    /// Conversation rooms with at least one member.
    pub rooms: usize,
    /// Messages persisted so far.
    pub messages_stored: i64,
}

/// Relay diagnostics endpoint.
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let messages_stored = state.store.message_count().await?;

    Ok(Json(StatsResponse {
        connections: state.registry.count(),
        rooms: state.rooms.room_count(),
        messages_stored,
    }))
}
