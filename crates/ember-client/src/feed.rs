//! Ordered message feed
//!
//! Applies subscription updates to an ordered message list. Display order
//! is ascending server timestamp with arrival order breaking ties; once a
//! message is stamped it never reorders, whatever order events arrive in.

use crate::models::{FeedUpdate, Message, RoomEvent};

#[derive(Debug, Default)]
pub struct MessageFeed {
    messages: Vec<Message>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn apply(&mut self, update: &FeedUpdate) {
        match update {
            FeedUpdate::Snapshot(snapshot) => {
                self.messages = snapshot.messages.clone();
                self.resort();
            }
            FeedUpdate::Event(event) => self.apply_event(event),
            // The owner refetches a snapshot; nothing to do locally
            FeedUpdate::Lagged => {}
        }
    }

    pub fn apply_event(&mut self, event: &RoomEvent) {
        match event {
            RoomEvent::MessageAdded(message) => {
                if self.messages.iter().any(|m| m.id == message.id) {
                    return;
                }
                self.messages.push(message.clone());
                self.resort();
            }
            RoomEvent::MessageEdited(message) | RoomEvent::ReactionToggled(message) => {
                // In-place replacement; the timestamp is unchanged so the
                // position is too
                if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *existing = message.clone();
                }
            }
            RoomEvent::MessageDeleted { id } => {
                self.messages.retain(|m| m.id != *id);
            }
            RoomEvent::PresenceChanged(_)
            | RoomEvent::TypingChanged { .. }
            | RoomEvent::RoomDeleted => {}
        }
    }

    fn resort(&mut self) {
        // Stable: equal timestamps keep their arrival order
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}
