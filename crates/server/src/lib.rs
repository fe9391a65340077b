//! Ember chat server library
//!
//! Rooms, messages, presence, typing indicators, user profiles and blob
//! attachments behind a small HTTP API with streaming live subscriptions.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::AuthManager;
use config::{AppState, ChatServerConfig};
use handlers::{
    clear_typing, create_room, delete_message, delete_room, edit_message, get_blob, get_chat_room,
    get_presence, get_typing, list_rooms, list_users, login, logout, me, send_message, set_offline,
    set_typing, signup, subscribe, toggle_reaction, update_presence, update_profile, upload_blob,
};
use store::JsonRoomStore;

/// Build the full route table over an app state
pub fn app_router(state: AppState) -> Router {
    let max_body = state.store.config().max_blob_size * 1024 * 1024;

    Router::new()
        // Auth and profiles
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/profile/{user_id}", put(update_profile))
        .route("/users", get(list_users))
        // Room directory
        .route("/chat/rooms", get(list_rooms).post(create_room))
        .route("/chat/{room_id}", get(get_chat_room).delete(delete_room))
        // Live subscription
        .route("/chat/{room_id}/subscribe", get(subscribe))
        // Messages
        .route("/chat/{room_id}/messages", post(send_message))
        .route(
            "/chat/{room_id}/messages/{message_id}",
            put(edit_message).delete(delete_message),
        )
        .route(
            "/chat/{room_id}/messages/{message_id}/reactions",
            post(toggle_reaction),
        )
        // Presence and typing
        .route(
            "/chat/{room_id}/presence",
            get(get_presence).put(update_presence).delete(set_offline),
        )
        .route(
            "/chat/{room_id}/typing",
            get(get_typing).put(set_typing).delete(clear_typing),
        )
        // Attachments
        .route("/blobs", post(upload_blob))
        .route("/blobs/{hash}", get(get_blob))
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }

    info!("=== Ember Chat Server ===");

    let root = ember_common::init_structure()?;
    info!("Data root: {:?}", root);

    let config = ChatServerConfig::default();
    config.ensure_dirs().await?;

    let auth_manager = Arc::new(AuthManager::new(config.users_db_path.clone()).await?);
    info!("Auth manager initialized");

    let store = Arc::new(JsonRoomStore::new(config.clone()).await?);
    info!("Room store initialized");

    let app_state = AppState {
        store,
        auth: auth_manager,
    };

    let app = app_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Ember Chat Server"
}
