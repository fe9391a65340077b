//! JSON-based room storage with live update fan-out
//!
//! One JSON document per room, written atomically, with an in-memory cache
//! and a broadcast channel per room feeding the subscription streams.
//! Presence records and typing markers are ephemeral and live only in
//! memory; staleness detection by readers is their recovery path.

use anyhow::Context;
use chrono::{DateTime, Utc};
use ember_blob::BlobStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ChatServerConfig;
use crate::models::{
    normalize_room_name, CreateMessageInput, Message, PresenceRecord, Room, RoomEvent, RoomSummary,
    TypingMarker,
};
use crate::store::{Result, StoreError};

/// Broadcast channel for real-time updates
#[derive(Clone)]
pub struct UpdateChannel {
    pub tx: broadcast::Sender<RoomEvent>,
}

/// Denormalized sender fields stamped onto a message at send time
#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// JSON-backed room store
pub struct JsonRoomStore {
    config: ChatServerConfig,
    /// Blob store for file attachments
    blob_store: Arc<BlobStore>,
    /// In-memory cache of loaded rooms
    rooms: RwLock<HashMap<String, Arc<RwLock<Room>>>>,
    /// Broadcast channels for each room
    channels: RwLock<HashMap<String, UpdateChannel>>,
    /// room id -> user id -> presence record
    presence: parking_lot::RwLock<HashMap<String, HashMap<String, PresenceRecord>>>,
    /// room id -> user id -> typing marker
    typing: parking_lot::RwLock<HashMap<String, HashMap<String, TypingMarker>>>,
}

impl JsonRoomStore {
    /// Create a new room store
    pub async fn new(config: ChatServerConfig) -> Result<Self> {
        config.ensure_dirs().await.map_err(StoreError::Storage)?;

        let blob_store = Arc::new(
            BlobStore::new(config.blob_dir.clone(), config.blob_dir.join("meta.sqlite"))
                .await
                .map_err(|e| StoreError::Storage(anyhow::Error::new(e)))?,
        );

        let store = Self {
            config,
            blob_store,
            rooms: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            presence: parking_lot::RwLock::new(HashMap::new()),
            typing: parking_lot::RwLock::new(HashMap::new()),
        };

        store.load_existing_rooms().await?;

        info!(
            "Room store initialized with {} rooms",
            store.rooms.read().await.len()
        );

        Ok(store)
    }

    pub fn config(&self) -> &ChatServerConfig {
        &self.config
    }

    /// Get blob store reference
    pub fn blob_store(&self) -> &BlobStore {
        &self.blob_store
    }

    /// Get the storage path for a room
    fn room_path(&self, room_id: &str) -> PathBuf {
        self.config.storage_dir.join(format!("{}.json", room_id))
    }

    /// Load all existing rooms from disk
    async fn load_existing_rooms(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.config.storage_dir)
            .await
            .context("Failed to read storage dir")?;
        let mut count = 0;

        while let Some(entry) = entries.next_entry().await.context("readdir")? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    match load_room_from_disk(stem, &path).await {
                        Ok(room) => {
                            self.rooms
                                .write()
                                .await
                                .insert(room.id.clone(), Arc::new(RwLock::new(room)));
                            count += 1;
                        }
                        Err(e) => {
                            warn!("Failed to load room from {:?}: {}", path, e);
                        }
                    }
                }
            }
        }

        info!("Loaded {} existing rooms from disk", count);
        Ok(())
    }

    /// Save a room to disk atomically
    async fn save_room_to_disk(&self, room: &Room) -> Result<()> {
        let path = self.room_path(&room.id);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(room).context("Failed to serialize room")?;

        fs::write(&temp_path, json)
            .await
            .context("Failed to write room temp file")?;

        fs::rename(&temp_path, &path)
            .await
            .context("Failed to rename room file into place")?;

        Ok(())
    }

    /// Create a room from a proposed display name.
    ///
    /// The identifier is the trimmed, lowercased name and must not collide
    /// with a known room. Two racing creators of the same name can both pass
    /// this check; the second write wins, which is an accepted limitation.
    pub async fn create_room(&self, name: &str, created_by: &str) -> Result<RoomSummary> {
        let (room_id, display) = normalize_room_name(name).ok_or(StoreError::InvalidName)?;

        {
            let rooms = self.rooms.read().await;
            if rooms.contains_key(&room_id) {
                return Err(StoreError::RoomExists);
            }
        }

        let room = Room::new(room_id.clone(), display, created_by);
        let summary = room.summary();

        self.save_room_to_disk(&room).await?;

        self.rooms
            .write()
            .await
            .insert(room_id.clone(), Arc::new(RwLock::new(room)));

        info!("Created room '{}' (by {})", room_id, created_by);

        Ok(summary)
    }

    /// Get a room if it exists
    pub async fn get_room(&self, room_id: &str) -> Result<Option<Arc<RwLock<Room>>>> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return Ok(Some(room.clone()));
            }
        }

        // Try to load from disk
        let path = self.room_path(room_id);
        if path.exists() {
            let room = load_room_from_disk(room_id, &path).await?;
            let room = Arc::new(RwLock::new(room));
            self.rooms
                .write()
                .await
                .insert(room_id.to_string(), room.clone());
            return Ok(Some(room));
        }

        Ok(None)
    }

    async fn require_room(&self, room_id: &str) -> Result<Arc<RwLock<Room>>> {
        self.get_room(room_id).await?.ok_or(StoreError::RoomNotFound)
    }

    pub async fn room_exists(&self, room_id: &str) -> Result<bool> {
        Ok(self.get_room(room_id).await?.is_some())
    }

    /// List all rooms, newest first
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms.values() {
            summaries.push(room.read().await.summary());
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Delete a room and everything that hangs off it.
    ///
    /// Only the creator may delete. The cascade removes attachment blobs
    /// (best effort), typing markers and presence records before the room
    /// document itself; a crash mid-way leaves orphans and no owning room,
    /// which is an accepted limitation. Subscribers receive `RoomDeleted`
    /// as the final event on the channel.
    pub async fn delete_room(&self, room_id: &str, caller: &str) -> Result<()> {
        let room_lock = self.require_room(room_id).await?;

        let blob_hashes: Vec<String> = {
            let room = room_lock.read().await;
            if room.created_by != caller {
                return Err(StoreError::NotOwner(
                    "Only the room creator can delete it".to_string(),
                ));
            }
            room.messages
                .iter()
                .filter_map(|m| m.attachment.as_ref().map(|a| a.blob_hash.clone()))
                .collect()
        };

        for hash in blob_hashes {
            if let Err(e) = self.blob_store.delete(&hash).await {
                warn!("Failed to delete blob {} during room cascade: {}", hash, e);
            }
        }

        self.typing.write().remove(room_id);
        self.presence.write().remove(room_id);

        self.rooms.write().await.remove(room_id);

        let path = self.room_path(room_id);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .context("Failed to remove room file")?;
        }

        self.broadcast(room_id, RoomEvent::RoomDeleted).await;

        info!("Deleted room '{}' (by {})", room_id, caller);

        Ok(())
    }

    /// Append a message. The server assigns the id and the timestamp that
    /// defines display order for every client.
    pub async fn add_message(
        &self,
        room_id: &str,
        sender: &SenderInfo,
        input: CreateMessageInput,
    ) -> Result<Message> {
        let room_lock = self.require_room(room_id).await?;
        let mut room = room_lock.write().await;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender: sender.id.clone(),
            sender_name: sender.display_name.clone(),
            sender_avatar: sender.avatar_url.clone(),
            kind: input.kind,
            text: input.text,
            attachment: input.attachment,
            created_at: Utc::now(),
            edited: false,
            reactions: Default::default(),
        };

        room.messages.push(message.clone());
        self.save_room_to_disk(&room).await?;
        drop(room);

        self.broadcast(room_id, RoomEvent::MessageAdded(message.clone()))
            .await;

        info!("Added message {} to room {}", message.id, room_id);

        Ok(message)
    }

    /// Replace a message's text. Sender only; no history is kept.
    pub async fn edit_message(
        &self,
        room_id: &str,
        message_id: &str,
        caller: &str,
        new_text: &str,
    ) -> Result<Message> {
        let room_lock = self.require_room(room_id).await?;
        let mut room = room_lock.write().await;

        let message = room
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound)?;

        if message.sender != caller {
            return Err(StoreError::NotOwner(
                "Only the sender can edit a message".to_string(),
            ));
        }

        message.text = new_text.to_string();
        message.edited = true;
        let updated = message.clone();

        self.save_room_to_disk(&room).await?;
        drop(room);

        self.broadcast(room_id, RoomEvent::MessageEdited(updated.clone()))
            .await;

        Ok(updated)
    }

    /// Delete a message. Sender only. The attachment blob goes first; a blob
    /// failure is logged and swallowed so the record is removed regardless.
    pub async fn delete_message(
        &self,
        room_id: &str,
        message_id: &str,
        caller: &str,
    ) -> Result<()> {
        let room_lock = self.require_room(room_id).await?;
        let mut room = room_lock.write().await;

        let idx = room
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound)?;

        if room.messages[idx].sender != caller {
            return Err(StoreError::NotOwner(
                "Only the sender can delete a message".to_string(),
            ));
        }

        if let Some(attachment) = &room.messages[idx].attachment {
            if let Err(e) = self.blob_store.delete(&attachment.blob_hash).await {
                warn!(
                    "Failed to delete blob {} for message {}: {}",
                    attachment.blob_hash, message_id, e
                );
            }
        }

        room.messages.remove(idx);
        self.save_room_to_disk(&room).await?;
        drop(room);

        self.broadcast(
            room_id,
            RoomEvent::MessageDeleted {
                id: message_id.to_string(),
            },
        )
        .await;

        Ok(())
    }

    /// Flip the caller's membership in a message's emoji reactor set.
    ///
    /// Expressed as a set toggle rather than a read-modify-write of a count,
    /// so concurrent reactions from different users commute.
    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: &str,
        emoji: &str,
        caller: &str,
    ) -> Result<Message> {
        let room_lock = self.require_room(room_id).await?;
        let mut room = room_lock.write().await;

        let message = room
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound)?;

        message.toggle_reaction(emoji, caller);
        let updated = message.clone();

        self.save_room_to_disk(&room).await?;
        drop(room);

        self.broadcast(room_id, RoomEvent::ReactionToggled(updated.clone()))
            .await;

        Ok(updated)
    }

    /// Get a room's messages in display order: ascending server timestamp,
    /// arrival order breaking ties (the sort is stable over the arrival-
    /// ordered list, so messages never reorder once stamped).
    pub async fn get_messages(&self, room_id: &str) -> Result<Vec<Message>> {
        let room_lock = self.require_room(room_id).await?;
        let room = room_lock.read().await;

        let mut messages = room.messages.clone();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(messages)
    }

    /// Heartbeat write for (room, user). Fails with `RoomNotFound` once the
    /// room is gone, which is how client heartbeat loops detect deletion.
    pub async fn heartbeat(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
    ) -> Result<PresenceRecord> {
        if !self.room_exists(room_id).await? {
            return Err(StoreError::RoomNotFound);
        }

        let record = PresenceRecord {
            user: user_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url,
            online: true,
            last_seen: Utc::now(),
        };

        self.presence
            .write()
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string(), record.clone());

        self.broadcast(room_id, RoomEvent::PresenceChanged(record.clone()))
            .await;

        Ok(record)
    }

    /// Best-effort offline write. A missing record (or a concurrently
    /// deleted room) is a no-op; staleness ageing covers that case.
    pub async fn set_offline(&self, room_id: &str, user_id: &str) -> Option<PresenceRecord> {
        let record = {
            let mut presence = self.presence.write();
            let room_presence = presence.get_mut(room_id)?;
            let record = room_presence.get_mut(user_id)?;
            record.online = false;
            record.last_seen = Utc::now();
            record.clone()
        };

        self.broadcast(room_id, RoomEvent::PresenceChanged(record.clone()))
            .await;

        Some(record)
    }

    /// Presence records that read as live at `now`
    pub fn presence_live_at(&self, room_id: &str, now: DateTime<Utc>) -> Vec<PresenceRecord> {
        let presence = self.presence.read();
        let Some(room_presence) = presence.get(room_id) else {
            return Vec::new();
        };

        let window = self.config.presence_window_secs;
        let mut live: Vec<PresenceRecord> = room_presence
            .values()
            .filter(|r| r.is_live(now, window))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.user.cmp(&b.user));
        live
    }

    pub fn presence_live(&self, room_id: &str) -> Vec<PresenceRecord> {
        self.presence_live_at(room_id, Utc::now())
    }

    #[cfg(test)]
    pub(crate) fn backdate_presence(&self, room_id: &str, user_id: &str, last_seen: DateTime<Utc>) {
        if let Some(record) = self
            .presence
            .write()
            .get_mut(room_id)
            .and_then(|m| m.get_mut(user_id))
        {
            record.last_seen = last_seen;
        }
    }

    /// Upsert the caller's typing marker
    pub async fn set_typing(&self, room_id: &str, user_id: &str) -> Result<TypingMarker> {
        if !self.room_exists(room_id).await? {
            return Err(StoreError::RoomNotFound);
        }

        let marker = TypingMarker {
            user: user_id.to_string(),
            at: Utc::now(),
        };

        let newly_typing = self
            .typing
            .write()
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string(), marker.clone())
            .is_none();

        // Keystroke refreshes only bump the timestamp; observers already
        // know the user is typing
        if newly_typing {
            self.broadcast(
                room_id,
                RoomEvent::TypingChanged {
                    user: user_id.to_string(),
                    typing: true,
                },
            )
            .await;
        }

        Ok(marker)
    }

    /// Remove the caller's typing marker. Idempotent; returns whether a
    /// marker was actually removed.
    pub async fn clear_typing(&self, room_id: &str, user_id: &str) -> bool {
        let removed = {
            let mut typing = self.typing.write();
            match typing.get_mut(room_id) {
                Some(room_typing) => room_typing.remove(user_id).is_some(),
                None => false,
            }
        };

        if removed {
            self.broadcast(
                room_id,
                RoomEvent::TypingChanged {
                    user: user_id.to_string(),
                    typing: false,
                },
            )
            .await;
        }

        removed
    }

    /// Current typing markers for a room
    pub fn typing_markers(&self, room_id: &str) -> Vec<TypingMarker> {
        let typing = self.typing.read();
        let Some(room_typing) = typing.get(room_id) else {
            return Vec::new();
        };
        let mut markers: Vec<TypingMarker> = room_typing.values().cloned().collect();
        markers.sort_by(|a, b| a.user.cmp(&b.user));
        markers
    }

    /// Get broadcast channel for a room
    pub async fn get_channel(&self, room_id: &str) -> UpdateChannel {
        let mut channels = self.channels.write().await;
        channels
            .entry(room_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(100);
                UpdateChannel { tx }
            })
            .clone()
    }

    /// Broadcast an update to all subscribers. Lagging or absent receivers
    /// are not an error.
    pub async fn broadcast(&self, room_id: &str, event: RoomEvent) {
        let channel = self.get_channel(room_id).await;
        let _ = channel.tx.send(event);
    }
}

/// Load a single room document
async fn load_room_from_disk(room_id: &str, path: &Path) -> Result<Room> {
    let content = fs::read_to_string(path)
        .await
        .context("Failed to read room file")?;
    let room: Room = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse room {} JSON", room_id))?;
    Ok(room)
}
