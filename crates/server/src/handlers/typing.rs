//! Typing indicator handlers
//!
//! A marker's presence means "currently typing"; expiry policy belongs to
//! the client coordinator, so the server returns markers verbatim.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::config::AppState;
use crate::error::Result;
use crate::models::TypingMarker;

use super::require_user;

/// GET /chat/{room_id}/typing
pub async fn get_typing(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TypingMarker>>> {
    require_user(&state, &headers).await?;
    Ok(Json(state.store.typing_markers(&room_id)))
}

/// PUT /chat/{room_id}/typing
///
/// Upserts the caller's marker; repeated keystrokes refresh the timestamp.
pub async fn set_typing(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TypingMarker>> {
    let caller = require_user(&state, &headers).await?;
    let marker = state.store.set_typing(&room_id, &caller.id).await?;
    Ok(Json(marker))
}

/// DELETE /chat/{room_id}/typing
///
/// Idempotent; detach cleanup must succeed even after the room is gone.
pub async fn clear_typing(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<()> {
    let caller = require_user(&state, &headers).await?;
    state.store.clear_typing(&room_id, &caller.id).await;
    Ok(())
}
