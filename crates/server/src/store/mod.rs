pub mod json_store;

pub use json_store::{JsonRoomStore, SenderInfo, UpdateChannel};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room not found")]
    RoomNotFound,

    #[error("room already exists")]
    RoomExists,

    #[error("message not found")]
    MessageNotFound,

    #[error("{0}")]
    NotOwner(String),

    #[error("room name cannot be empty")]
    InvalidName,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
