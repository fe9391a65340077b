//! Wire models mirroring the server's API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub blob_hash: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingMarker {
    pub user: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub room: RoomSummary,
    pub messages: Vec<Message>,
}

/// Body sent when creating a message
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            text: body.into(),
            attachment: None,
        }
    }
}

/// Response from a blob upload; carries everything needed to reference the
/// blob from a message record.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedBlob {
    pub url: String,
    pub blob_hash: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl UploadedBlob {
    pub fn attachment(&self) -> Attachment {
        Attachment {
            url: self.url.clone(),
            blob_hash: self.blob_hash.clone(),
            filename: self.filename.clone(),
        }
    }
}

/// A live update fanned out on a room's subscription stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "event", content = "data")]
pub enum RoomEvent {
    MessageAdded(Message),
    MessageEdited(Message),
    MessageDeleted { id: String },
    ReactionToggled(Message),
    PresenceChanged(PresenceRecord),
    TypingChanged { user: String, typing: bool },
    RoomDeleted,
}

/// What a subscription yields to the application
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    /// Initial full snapshot, and re-sent state after a lag
    Snapshot(ChatSnapshot),
    Event(RoomEvent),
    /// The server dropped updates for this subscriber; refetch the snapshot
    Lagged,
}
