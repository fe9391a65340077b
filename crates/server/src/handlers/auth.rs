//! Auth and profile handlers

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::UserProfile;
use crate::config::AppState;
use crate::error::{Error, Result};

use super::{bearer_token, require_user};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(default)]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub about: Option<String>,
    pub avatar_url: Option<String>,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/signup - {}", req.email);

    let user = state
        .auth
        .signup(req.email.clone(), req.username, req.password.clone())
        .await
        .map_err(|e| {
            warn!("Signup failed for {}: {}", req.email, e);
            Error::BadRequest(e.to_string())
        })?;

    // Issue a session right away; signing up is also signing in
    let (_, session) = state
        .auth
        .login(req.email, req.password)
        .await
        .map_err(|e| {
            warn!("Login after signup failed: {}", e);
            Error::Internal("Account created but login failed".to_string())
        })?;

    Ok(Json(AuthResponse {
        token: session.token,
        user_id: user.id,
        username: user.username,
    }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (profile, session) = state
        .auth
        .login(req.email.clone(), req.password)
        .await
        .map_err(|e| {
            warn!("Login failed for {}: {}", req.email, e);
            Error::LoginFail
        })?;

    Ok(Json(AuthResponse {
        token: session.token,
        user_id: profile.id,
        username: profile.username,
    }))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<()> {
    info!("POST /auth/logout");

    let token = bearer_token(&headers)?;
    state.auth.logout(token).await?;
    Ok(())
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserProfile>> {
    let profile = require_user(&state, &headers).await?;
    Ok(Json(profile))
}

/// PUT /auth/profile/{user_id}
///
/// About text and avatar are mutable by the owning user only.
pub async fn update_profile(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    info!("PUT /auth/profile/{}", user_id);

    let caller = require_user(&state, &headers).await?;
    if caller.id != user_id {
        return Err(Error::PermissionDenied(
            "Only the profile owner can edit it".to_string(),
        ));
    }

    let profile = state
        .auth
        .update_profile(&user_id, req.about, req.avatar_url)
        .await?;

    Ok(Json(profile))
}

/// GET /users
///
/// The profile directory clients use to resolve presence and typing user
/// ids to display names.
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>> {
    require_user(&state, &headers).await?;
    let users = state.auth.list_users().await?;
    Ok(Json(users))
}
