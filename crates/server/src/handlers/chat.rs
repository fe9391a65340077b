//! Message and attachment handlers

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::Serialize;
use tracing::{error, info};

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::{
    ChatSnapshot, CreateMessageInput, EditMessageInput, Message, MessageKind, ReactionInput,
};
use crate::store::SenderInfo;

use super::require_user;

fn sender_info(profile: &crate::auth::UserProfile) -> SenderInfo {
    SenderInfo {
        id: profile.id.clone(),
        display_name: profile.username.clone(),
        avatar_url: profile.avatar_url.clone(),
    }
}

/// GET /chat/{room_id}
///
/// Full snapshot: room metadata plus messages in display order.
pub async fn get_chat_room(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatSnapshot>> {
    info!("GET /chat/{}", room_id);

    require_user(&state, &headers).await?;

    let room_lock = state
        .store
        .get_room(&room_id)
        .await?
        .ok_or(Error::RoomNotFound)?;
    let room = room_lock.read().await.summary();

    let messages = state.store.get_messages(&room_id).await?;

    Ok(Json(ChatSnapshot { room, messages }))
}

/// POST /chat/{room_id}/messages
///
/// The client uploads any attachment blob first and only then sends the
/// record referencing it, so a message never points at a missing blob.
pub async fn send_message(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateMessageInput>,
) -> Result<Json<Message>> {
    info!("POST /chat/{}/messages", room_id);

    let caller = require_user(&state, &headers).await?;

    if input.text.trim().is_empty() && input.attachment.is_none() {
        return Err(Error::BadRequest("Nothing to send".to_string()));
    }
    if input.kind != MessageKind::Text && input.attachment.is_none() {
        return Err(Error::BadRequest(
            "Media messages need an attachment".to_string(),
        ));
    }

    let message = state
        .store
        .add_message(&room_id, &sender_info(&caller), input)
        .await?;

    Ok(Json(message))
}

/// PUT /chat/{room_id}/messages/{message_id}
pub async fn edit_message(
    Path((room_id, message_id)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<EditMessageInput>,
) -> Result<Json<Message>> {
    info!("PUT /chat/{}/messages/{}", room_id, message_id);

    let caller = require_user(&state, &headers).await?;

    let text = input.text.trim();
    if text.is_empty() {
        return Err(Error::BadRequest("Edited text cannot be empty".to_string()));
    }

    let message = state
        .store
        .edit_message(&room_id, &message_id, &caller.id, text)
        .await?;

    Ok(Json(message))
}

/// DELETE /chat/{room_id}/messages/{message_id}
pub async fn delete_message(
    Path((room_id, message_id)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<()> {
    info!("DELETE /chat/{}/messages/{}", room_id, message_id);

    let caller = require_user(&state, &headers).await?;
    state
        .store
        .delete_message(&room_id, &message_id, &caller.id)
        .await?;
    Ok(())
}

/// POST /chat/{room_id}/messages/{message_id}/reactions
pub async fn toggle_reaction(
    Path((room_id, message_id)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ReactionInput>,
) -> Result<Json<Message>> {
    info!(
        "POST /chat/{}/messages/{}/reactions - {}",
        room_id, message_id, input.emoji
    );

    let caller = require_user(&state, &headers).await?;

    if input.emoji.trim().is_empty() {
        return Err(Error::BadRequest("Missing emoji".to_string()));
    }

    let message = state
        .store
        .toggle_reaction(&room_id, &message_id, &input.emoji, &caller.id)
        .await?;

    Ok(Json(message))
}

#[derive(Debug, Serialize)]
pub struct BlobUploadResponse {
    pub url: String,
    pub blob_hash: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    /// Message kind the upload classifies as, derived from its MIME type
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

/// POST /blobs
///
/// Upload an attachment. The response carries everything the client needs
/// to reference the blob from a message record.
pub async fn upload_blob(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<BlobUploadResponse>> {
    info!("POST /blobs - uploading blob");

    require_user(&state, &headers).await?;

    let mut filename = None;
    let mut content_type = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {}", e);
        Error::BadRequest("Malformed multipart body".to_string())
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            filename = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            data = Some(field.bytes().await.map_err(|e| {
                error!("Failed to read file data: {}", e);
                Error::BadRequest("Failed to read file data".to_string())
            })?);
        }
    }

    let data = data.ok_or_else(|| Error::BadRequest("Missing file field".to_string()))?;
    let filename = filename.unwrap_or_else(|| "unnamed".to_string());
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let max_bytes = state.store.config().max_blob_size * 1024 * 1024;
    if data.len() > max_bytes {
        return Err(Error::BadRequest(format!(
            "Blob exceeds the {} MB limit",
            state.store.config().max_blob_size
        )));
    }

    let meta = state
        .store
        .blob_store()
        .put(data, Some(content_type.clone()), Some(filename.clone()))
        .await?;

    info!("Stored blob {} ({} bytes)", meta.key, meta.size);

    Ok(Json(BlobUploadResponse {
        url: format!("/blobs/{}", meta.key),
        blob_hash: meta.key,
        filename,
        kind: MessageKind::from_content_type(&content_type),
        content_type,
        size: meta.size,
    }))
}

/// GET /blobs/{hash}
///
/// Public download; the URL in a message record points here.
pub async fn get_blob(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<(HeaderMap, axum::body::Bytes)> {
    info!("GET /blobs/{}", hash);

    let (data, meta) = state
        .store
        .blob_store()
        .get(&hash)
        .await?
        .ok_or(Error::BlobNotFound)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        meta.content_type
            .unwrap_or_else(|| "application/octet-stream".to_string())
            .parse()
            .map_err(|_| Error::Internal("Invalid stored content type".to_string()))?,
    );

    Ok((headers, data))
}
