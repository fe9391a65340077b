//! Room directory handlers

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::config::AppState;
use crate::error::Result;
use crate::models::{CreateRoomInput, RoomSummary};

use super::require_user;

/// GET /chat/rooms
///
/// All rooms, newest first.
pub async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>> {
    require_user(&state, &headers).await?;
    Ok(Json(state.store.list_rooms().await))
}

/// POST /chat/rooms
///
/// Normalizes the proposed name into the identifier and rejects collisions
/// against the known room list.
pub async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateRoomInput>,
) -> Result<Json<RoomSummary>> {
    info!("POST /chat/rooms - '{}'", input.name);

    let caller = require_user(&state, &headers).await?;
    let summary = state.store.create_room(&input.name, &caller.id).await?;
    Ok(Json(summary))
}

/// DELETE /chat/{room_id}
///
/// Creator only; cascades over messages, attachment blobs, typing markers
/// and presence records before removing the room itself.
pub async fn delete_room(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<()> {
    info!("DELETE /chat/{}", room_id);

    let caller = require_user(&state, &headers).await?;
    state.store.delete_room(&room_id, &caller.id).await?;
    Ok(())
}
