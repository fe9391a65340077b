//! Chat server configuration

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::store::JsonRoomStore;

/// Configuration for the Ember chat server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Storage directory for room documents
    pub storage_dir: PathBuf,
    /// Blob storage directory
    pub blob_dir: PathBuf,
    /// Accounts and sessions database
    pub users_db_path: PathBuf,
    /// Port the HTTP API listens on
    pub port: u16,
    /// Max blob size in MB
    pub max_blob_size: usize,
    /// Presence records older than this many seconds read as offline
    pub presence_window_secs: i64,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            storage_dir: ember_common::rooms_dir(),
            blob_dir: ember_common::blobs_dir(),
            users_db_path: ember_common::users_db_path(),
            port: 3001,
            max_blob_size: 50,
            presence_window_secs: 60,
        }
    }
}

impl ChatServerConfig {
    /// Create config rooted at a custom base directory (used by tests)
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base = base_dir.into();
        Self {
            storage_dir: base.join("rooms"),
            blob_dir: base.join("blobs"),
            users_db_path: base.join("users.sqlite"),
            ..Self::default()
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        tokio::fs::create_dir_all(&self.blob_dir).await?;
        if let Some(parent) = self.users_db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonRoomStore>,
    pub auth: Arc<AuthManager>,
}
