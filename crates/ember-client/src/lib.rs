//! Headless client library for the Ember chat server.
//!
//! Everything a mounted room view needs lives behind [`RoomSession`]: the
//! live subscription, the presence heartbeat loop and the typing
//! coordinator, acquired together and released together. The individual
//! pieces are usable on their own.

pub mod api;
pub mod feed;
pub mod models;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod typing;
pub mod util;
mod wire;

pub use api::{ApiClient, Subscription};
pub use feed::MessageFeed;
pub use models::{
    Attachment, AuthResponse, ChatSnapshot, FeedUpdate, Message, MessageKind, PresenceRecord,
    RoomEvent, RoomSummary, TypingMarker, UploadedBlob, UserProfile,
};
pub use presence::PresenceReporter;
pub use rooms::{normalize_room_name, RoomDirectory};
pub use session::{RoomSession, SessionOptions};
pub use typing::{typing_banner, TypingCoordinator};
pub use util::{presence_age, short_name};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    NotAllowed(String),

    #[error("room already exists")]
    RoomExists,

    #[error("room name cannot be empty")]
    InvalidRoomName,
}

impl ClientError {
    /// A 404 on a room-scoped write means the room disappeared underneath
    /// us; heartbeat loops use this to stop and force an exit.
    pub fn is_room_gone(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
