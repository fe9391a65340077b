//! Typed HTTP client for the Ember chat server

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{
    AuthResponse, ChatSnapshot, FeedUpdate, Message, NewMessage, PresenceRecord, RoomEvent,
    RoomSummary, TypingMarker, UploadedBlob, UserProfile,
};
use crate::wire::FrameDecoder;
use crate::{ClientError, Result};

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Turn a non-2xx response into `ClientError::Api` with the server's
    /// error message when it sent one.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| status.to_string());

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json_of<T: DeserializeOwned>(response: Response) -> Result<T> {
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    // ---- auth & profiles ----

    /// Register and sign in; the returned session token is retained for
    /// every subsequent call.
    pub async fn signup(&self, email: &str, username: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.url("/auth/signup"))
            .json(&serde_json::json!({
                "email": email,
                "username": username,
                "password": password,
            }))
            .send()
            .await?;

        let auth: AuthResponse = Self::json_of(response).await?;
        self.set_token(Some(auth.token.clone()));
        Ok(auth)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let auth: AuthResponse = Self::json_of(response).await?;
        self.set_token(Some(auth.token.clone()));
        Ok(auth)
    }

    pub async fn logout(&self) -> Result<()> {
        let response = self.authed(self.http.post(self.url("/auth/logout"))).send().await?;
        Self::check(response).await?;
        self.set_token(None);
        Ok(())
    }

    pub async fn me(&self) -> Result<UserProfile> {
        let response = self.authed(self.http.get(self.url("/auth/me"))).send().await?;
        Self::json_of(response).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let response = self.authed(self.http.get(self.url("/users"))).send().await?;
        Self::json_of(response).await
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        about: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserProfile> {
        let response = self
            .authed(self.http.put(self.url(&format!("/auth/profile/{}", user_id))))
            .json(&serde_json::json!({
                "about": about,
                "avatar_url": avatar_url,
            }))
            .send()
            .await?;
        Self::json_of(response).await
    }

    /// Upload a new avatar and point the profile at its public URL
    pub async fn update_avatar(
        &self,
        user_id: &str,
        image: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<UserProfile> {
        let blob = self.upload_blob(image, filename, content_type).await?;
        self.update_profile(user_id, None, Some(&blob.url)).await
    }

    // ---- room directory ----

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        let response = self.authed(self.http.get(self.url("/chat/rooms"))).send().await?;
        Self::json_of(response).await
    }

    pub async fn create_room(&self, name: &str) -> Result<RoomSummary> {
        let response = self
            .authed(self.http.post(self.url("/chat/rooms")))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn delete_room(&self, room_id: &str) -> Result<()> {
        let response = self
            .authed(self.http.delete(self.url(&format!("/chat/{}", room_id))))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // ---- messages ----

    pub async fn snapshot(&self, room_id: &str) -> Result<ChatSnapshot> {
        let response = self
            .authed(self.http.get(self.url(&format!("/chat/{}", room_id))))
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn send_message(&self, room_id: &str, message: &NewMessage) -> Result<Message> {
        let response = self
            .authed(self.http.post(self.url(&format!("/chat/{}/messages", room_id))))
            .json(message)
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn send_text(&self, room_id: &str, text: &str) -> Result<Message> {
        self.send_message(room_id, &NewMessage::text(text)).await
    }

    /// Send a media message: the blob is committed to storage first and the
    /// record written only after, so a message never references a missing
    /// blob. (A blob orphaned by a failed record write is an accepted,
    /// non-fatal leak.)
    pub async fn send_media_message(
        &self,
        room_id: &str,
        caption: &str,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<Message> {
        let blob = self.upload_blob(data, filename, content_type).await?;

        let message = NewMessage {
            kind: blob.kind,
            text: caption.to_string(),
            attachment: Some(blob.attachment()),
        };

        self.send_message(room_id, &message).await
    }

    pub async fn edit_message(&self, room_id: &str, message_id: &str, text: &str) -> Result<Message> {
        let response = self
            .authed(
                self.http
                    .put(self.url(&format!("/chat/{}/messages/{}", room_id, message_id))),
            )
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .authed(
                self.http
                    .delete(self.url(&format!("/chat/{}/messages/{}", room_id, message_id))),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message> {
        let response = self
            .authed(self.http.post(self.url(&format!(
                "/chat/{}/messages/{}/reactions",
                room_id, message_id
            ))))
            .json(&serde_json::json!({ "emoji": emoji }))
            .send()
            .await?;
        Self::json_of(response).await
    }

    // ---- blobs ----

    pub async fn upload_blob(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadedBlob> {
        let part = reqwest::multipart::Part::stream(data)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authed(self.http.post(self.url("/blobs")))
            .multipart(form)
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn download_blob(&self, blob_hash: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(self.url(&format!("/blobs/{}", blob_hash)))
            .send()
            .await?;
        Ok(Self::check(response).await?.bytes().await?)
    }

    // ---- presence ----

    pub async fn heartbeat(
        &self,
        room_id: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<PresenceRecord> {
        let response = self
            .authed(self.http.put(self.url(&format!("/chat/{}/presence", room_id))))
            .json(&serde_json::json!({
                "display_name": display_name,
                "avatar_url": avatar_url,
            }))
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn set_offline(&self, room_id: &str) -> Result<()> {
        let response = self
            .authed(self.http.delete(self.url(&format!("/chat/{}/presence", room_id))))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn presence(&self, room_id: &str) -> Result<Vec<PresenceRecord>> {
        let response = self
            .authed(self.http.get(self.url(&format!("/chat/{}/presence", room_id))))
            .send()
            .await?;
        Self::json_of(response).await
    }

    // ---- typing ----

    pub async fn set_typing(&self, room_id: &str) -> Result<TypingMarker> {
        let response = self
            .authed(self.http.put(self.url(&format!("/chat/{}/typing", room_id))))
            .send()
            .await?;
        Self::json_of(response).await
    }

    pub async fn clear_typing(&self, room_id: &str) -> Result<()> {
        let response = self
            .authed(self.http.delete(self.url(&format!("/chat/{}/typing", room_id))))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn typing(&self, room_id: &str) -> Result<Vec<TypingMarker>> {
        let response = self
            .authed(self.http.get(self.url(&format!("/chat/{}/typing", room_id))))
            .send()
            .await?;
        Self::json_of(response).await
    }

    // ---- subscriptions ----

    /// Open the room's live subscription. The returned handle owns the pump
    /// task; dropping it (or calling `detach`) cancels the stream.
    pub async fn subscribe(&self, room_id: &str) -> Result<Subscription> {
        let response = self
            .authed(self.http.get(self.url(&format!("/chat/{}/subscribe", room_id))))
            .send()
            .await?;
        let response = Self::check(response).await?;

        let (tx, rx) = mpsc::channel(64);
        let room_id = room_id.to_string();

        let task = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = FrameDecoder::new();

            'outer: while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Subscription to '{}' broke: {}", room_id, e);
                        break;
                    }
                };

                for frame in decoder.push(&chunk) {
                    let update = decode_frame(&frame.event, frame.data.as_deref());
                    let Some(update) = update else { continue };

                    let ended = matches!(update, FeedUpdate::Event(RoomEvent::RoomDeleted));
                    if tx.send(update).await.is_err() {
                        // Receiver dropped; the view detached
                        break 'outer;
                    }
                    if ended {
                        debug!("Subscription to '{}' ended: room deleted", room_id);
                        break 'outer;
                    }
                }
            }
        });

        Ok(Subscription {
            updates: rx,
            task: Some(task),
        })
    }
}

fn decode_frame(event: &str, data: Option<&str>) -> Option<FeedUpdate> {
    match event {
        "snapshot" => {
            let snapshot = serde_json::from_str::<ChatSnapshot>(data?).ok()?;
            Some(FeedUpdate::Snapshot(snapshot))
        }
        "lagged" => Some(FeedUpdate::Lagged),
        _ => {
            let event = serde_json::from_str::<RoomEvent>(data?).ok()?;
            Some(FeedUpdate::Event(event))
        }
    }
}

/// Live subscription handle. The pump task is cancelled on drop, so a
/// subscription can never outlive the view that opened it.
pub struct Subscription {
    updates: mpsc::Receiver<FeedUpdate>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<FeedUpdate> {
        self.updates.recv().await
    }

    pub fn detach(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
