//! HTTP handlers for the Ember chat server

pub mod auth;
pub mod chat;
pub mod presence;
pub mod rooms;
pub mod subscribe;
pub mod typing;

// Re-export AppState from config
pub use crate::config::AppState;

pub use auth::{list_users, login, logout, me, signup, update_profile};
pub use chat::{
    delete_message, edit_message, get_blob, get_chat_room, send_message, toggle_reaction,
    upload_blob,
};
pub use presence::{get_presence, set_offline, update_presence};
pub use rooms::{create_room, delete_room, list_rooms};
pub use subscribe::subscribe;
pub use typing::{clear_typing, get_typing, set_typing};

use axum::http::HeaderMap;

use crate::auth::UserProfile;
use crate::error::Error;

/// Resolve the caller from the `Authorization: Bearer <token>` header.
///
/// Client-side permission checks are advisory only; every mutating handler
/// goes through this before touching the store.
pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserProfile, Error> {
    let value = headers
        .get(http::header::AUTHORIZATION)
        .ok_or(Error::AuthFailNoToken)?;
    let value = value
        .to_str()
        .map_err(|_| Error::AuthFailTokenWrongFormat)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(Error::AuthFailTokenWrongFormat)?;

    state
        .auth
        .validate_session(token)
        .await
        .map_err(|_| Error::InvalidSession)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    headers
        .get(http::header::AUTHORIZATION)
        .ok_or(Error::AuthFailNoToken)?
        .to_str()
        .map_err(|_| Error::AuthFailTokenWrongFormat)?
        .strip_prefix("Bearer ")
        .ok_or(Error::AuthFailTokenWrongFormat)
}
