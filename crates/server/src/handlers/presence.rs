//! Presence handlers
//!
//! Heartbeat writes keep a (room, user) record fresh; readers apply the
//! freshness window independently, so stale records age into "offline"
//! without any central eviction.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::config::AppState;
use crate::error::Result;
use crate::models::{HeartbeatInput, PresenceRecord};

use super::require_user;

/// GET /chat/{room_id}/presence
///
/// Records inside the freshness window only. The stored online flag is a
/// hint; liveness is decided by `last_seen` alone.
pub async fn get_presence(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PresenceRecord>>> {
    require_user(&state, &headers).await?;
    Ok(Json(state.store.presence_live(&room_id)))
}

/// PUT /chat/{room_id}/presence
///
/// The heartbeat write. Returns 404 once the room is deleted, which is the
/// signal a client heartbeat loop uses to stop and exit the room view.
pub async fn update_presence(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<HeartbeatInput>,
) -> Result<Json<PresenceRecord>> {
    let caller = require_user(&state, &headers).await?;

    let record = state
        .store
        .heartbeat(&room_id, &caller.id, &input.display_name, input.avatar_url)
        .await?;

    Ok(Json(record))
}

/// DELETE /chat/{room_id}/presence
///
/// Best-effort offline write on clean detach. Succeeds even when the room
/// or the record is already gone.
pub async fn set_offline(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<()> {
    info!("DELETE /chat/{}/presence", room_id);

    let caller = require_user(&state, &headers).await?;
    state.store.set_offline(&room_id, &caller.id).await;
    Ok(())
}
