//! Room directory operations

use std::sync::Arc;
use tracing::info;

use crate::api::ApiClient;
use crate::models::RoomSummary;
use crate::{ClientError, Result};

/// Normalize a proposed room name into its identifier.
///
/// Returns `(id, display_name)`; the identifier is the trimmed, lowercased
/// name, matching the server's normalization.
pub fn normalize_room_name(name: &str) -> Option<(String, String)> {
    let display = name.trim();
    if display.is_empty() {
        return None;
    }
    Some((display.to_lowercase(), display.to_string()))
}

/// Client-side room list with the directory operations.
///
/// The collision check before create is advisory: it runs against the
/// currently-known list, so two concurrent creators of the same name can
/// still race. The server applies the same check against its own list.
pub struct RoomDirectory {
    api: Arc<ApiClient>,
    rooms: Vec<RoomSummary>,
}

impl RoomDirectory {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            rooms: Vec::new(),
        }
    }

    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    pub async fn refresh(&mut self) -> Result<&[RoomSummary]> {
        self.rooms = self.api.list_rooms().await?;
        Ok(&self.rooms)
    }

    /// Create a room after normalizing and checking the known list for a
    /// collision.
    pub async fn create(&mut self, name: &str) -> Result<RoomSummary> {
        let (room_id, _) = normalize_room_name(name).ok_or(ClientError::InvalidRoomName)?;

        if self.rooms.iter().any(|r| r.id == room_id) {
            return Err(ClientError::RoomExists);
        }

        let summary = self.api.create_room(name).await?;
        info!("Created room '{}'", summary.id);
        self.rooms.insert(0, summary.clone());
        Ok(summary)
    }

    /// Whether `user_id` may delete the room (creator only)
    pub fn can_delete(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .iter()
            .any(|r| r.id == room_id && r.created_by == user_id)
    }

    /// Delete a room. The ownership check here is advisory; the server
    /// enforces it again.
    pub async fn delete(&mut self, room_id: &str, user_id: &str) -> Result<()> {
        if !self.can_delete(room_id, user_id) {
            return Err(ClientError::NotAllowed(
                "Only the room creator can delete it".to_string(),
            ));
        }

        self.api.delete_room(room_id).await?;
        self.rooms.retain(|r| r.id != room_id);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn seed(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(id: &str, created_by: &str) -> RoomSummary {
        RoomSummary {
            id: id.to_string(),
            name: id.to_string(),
            created_at: Utc::now(),
            created_by: created_by.to_string(),
        }
    }

    fn directory_with(rooms: Vec<RoomSummary>) -> RoomDirectory {
        let api = Arc::new(ApiClient::new("http://localhost:0"));
        let mut dir = RoomDirectory::new(api);
        dir.seed(rooms);
        dir
    }

    #[test]
    fn test_normalize_room_name() {
        assert_eq!(
            normalize_room_name("  General  "),
            Some(("general".to_string(), "General".to_string()))
        );
        assert_eq!(normalize_room_name(" \t "), None);
    }

    #[tokio::test]
    async fn test_create_rejects_known_collision_before_any_write() {
        let mut dir = directory_with(vec![summary("general", "alice")]);

        // Fails on the client-side check; no request ever leaves
        let err = dir.create("  GENERAL ").await.unwrap_err();
        assert!(matches!(err, ClientError::RoomExists));

        let err = dir.create("   ").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRoomName));
    }

    #[tokio::test]
    async fn test_delete_is_gated_on_creator() {
        let mut dir = directory_with(vec![summary("general", "alice")]);

        assert!(dir.can_delete("general", "alice"));
        assert!(!dir.can_delete("general", "bob"));

        let err = dir.delete("general", "bob").await.unwrap_err();
        assert!(matches!(err, ClientError::NotAllowed(_)));
        // Nothing was removed from the known list
        assert_eq!(dir.rooms().len(), 1);
    }
}
