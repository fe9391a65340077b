use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chat room document. Messages live inside the document in arrival order;
/// display order is derived from the server-assigned timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            created_by: created_by.into(),
            messages: Vec::new(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            created_by: self.created_by.clone(),
        }
    }
}

/// Room metadata without the message payload, as returned by the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    /// Display fields denormalized at send time
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Body for text messages, caption for media messages
    pub text: String,
    pub attachment: Option<Attachment>,
    /// Server-assigned; the sole ordering key
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    /// emoji -> ids of users who reacted with it (set semantics)
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<String>>,
}

impl Message {
    /// Flip the caller's membership in the emoji's reactor set. Returns true
    /// if the caller is a reactor after the toggle.
    pub fn toggle_reaction(&mut self, emoji: &str, user: &str) -> bool {
        let reactors = self.reactions.entry(emoji.to_string()).or_default();
        if let Some(pos) = reactors.iter().position(|u| u == user) {
            reactors.remove(pos);
            if reactors.is_empty() {
                self.reactions.remove(emoji);
            }
            false
        } else {
            reactors.push(user.to_string());
            true
        }
    }
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

impl MessageKind {
    /// Classify an uploaded file by its MIME type, the way the composer does
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            MessageKind::Image
        } else if content_type.starts_with("video/") {
            MessageKind::Video
        } else {
            MessageKind::File
        }
    }
}

/// Reference to an uploaded attachment blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Public download URL
    pub url: String,
    /// Content hash in the blob store, used for deletion
    pub blob_hash: String,
    pub filename: String,
}

/// Presence information for one user in one room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Latest-write-wins hint; liveness is decided by `last_seen` alone
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// A record reads as live only while the last heartbeat is inside the
    /// freshness window, regardless of the stored `online` flag.
    pub fn is_live(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        (now - self.last_seen).num_seconds() < window_secs
    }
}

/// Typing indicator marker. Its presence means "currently typing".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingMarker {
    pub user: String,
    pub at: DateTime<Utc>,
}

/// Room snapshot returned by GET /chat/{room_id}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub room: RoomSummary,
    pub messages: Vec<Message>,
}

/// Input for creating a message
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageInput {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageInput {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionInput {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomInput {
    pub name: String,
}

/// Heartbeat body; display fields are denormalized into the presence record
#[derive(Debug, Deserialize)]
pub struct HeartbeatInput {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A live update fanned out to every subscriber of a room
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

impl RoomEvent {
    /// Wire name used on the subscription stream's `event:` line
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::MessageAdded(_) => "message-added",
            RoomEvent::MessageEdited(_) => "message-edited",
            RoomEvent::MessageDeleted { .. } => "message-deleted",
            RoomEvent::ReactionToggled(_) => "reaction-toggled",
            RoomEvent::PresenceChanged(_) => "presence-changed",
            RoomEvent::TypingChanged { .. } => "typing-changed",
            RoomEvent::RoomDeleted => "room-deleted",
        }
    }
}

/// Normalize a proposed room name into its identifier.
///
/// Returns `(id, display_name)` or `None` when the trimmed name is empty.
/// The identifier doubles as the document key, so two names differing only
/// in case or surrounding whitespace collide.
pub fn normalize_room_name(name: &str) -> Option<(String, String)> {
    let display = name.trim();
    if display.is_empty() {
        return None;
    }
    Some((display.to_lowercase(), display.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_reaction_is_its_own_inverse() {
        let mut msg = Message {
            id: "m1".into(),
            sender: "alice".into(),
            sender_name: "Alice".into(),
            sender_avatar: None,
            kind: MessageKind::Text,
            text: "hi".into(),
            attachment: None,
            created_at: Utc::now(),
            edited: false,
            reactions: BTreeMap::new(),
        };

        assert!(msg.toggle_reaction("👍", "bob"));
        assert_eq!(msg.reactions["👍"], vec!["bob".to_string()]);

        assert!(!msg.toggle_reaction("👍", "bob"));
        // Empty reactor sets are pruned
        assert!(!msg.reactions.contains_key("👍"));
    }

    #[test]
    fn test_toggle_reaction_keeps_other_reactors() {
        let mut msg = Message {
            id: "m1".into(),
            sender: "alice".into(),
            sender_name: "Alice".into(),
            sender_avatar: None,
            kind: MessageKind::Text,
            text: "hi".into(),
            attachment: None,
            created_at: Utc::now(),
            edited: false,
            reactions: BTreeMap::new(),
        };

        msg.toggle_reaction("🔥", "bob");
        msg.toggle_reaction("🔥", "carol");
        msg.toggle_reaction("🔥", "bob");

        assert_eq!(msg.reactions["🔥"], vec!["carol".to_string()]);
    }

    #[test]
    fn test_presence_liveness_ignores_online_flag() {
        let now = Utc::now();
        let record = PresenceRecord {
            user: "alice".into(),
            display_name: "Alice".into(),
            avatar_url: None,
            online: true,
            last_seen: now - chrono::Duration::seconds(90),
        };

        // Declared online but stale: not live
        assert!(!record.is_live(now, 60));

        let fresh = PresenceRecord {
            online: false,
            last_seen: now - chrono::Duration::seconds(5),
            ..record
        };
        // Declared offline but fresh: still counts as live to readers
        assert!(fresh.is_live(now, 60));
    }

    #[test]
    fn test_message_kind_from_content_type() {
        assert_eq!(
            MessageKind::from_content_type("image/png"),
            MessageKind::Image
        );
        assert_eq!(
            MessageKind::from_content_type("video/mp4"),
            MessageKind::Video
        );
        assert_eq!(
            MessageKind::from_content_type("application/pdf"),
            MessageKind::File
        );
    }

    #[test]
    fn test_normalize_room_name() {
        assert_eq!(
            normalize_room_name("  General  "),
            Some(("general".to_string(), "General".to_string()))
        );
        assert_eq!(normalize_room_name("   "), None);
    }
}
