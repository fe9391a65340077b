//! Content-addressed blob storage for chat attachments.
//!
//! Blobs are keyed by the SHA-256 hash of their content. File bytes live on
//! disk, metadata lives in a small SQLite table, and every write goes through
//! a temp-file-then-rename so a crash never leaves a half-written blob.

mod store;

pub use store::{atomic_write, content_hash, BlobMetadata, BlobStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Meta(String),

    #[error("checksum mismatch for blob {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, BlobError>;

impl From<rusqlite::Error> for BlobError {
    fn from(err: rusqlite::Error) -> Self {
        BlobError::Meta(err.to_string())
    }
}

impl From<serde_json::Error> for BlobError {
    fn from(err: serde_json::Error) -> Self {
        BlobError::Meta(err.to_string())
    }
}
