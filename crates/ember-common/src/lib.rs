//! Centralized directory structure management for Ember
//!
//! Directory layout:
//! ```text
//! ember_data/
//! ├── rooms/           # One JSON document per chat room
//! ├── blobs/           # Content-addressed attachment storage
//! │   └── meta.sqlite  # Blob metadata
//! └── users.sqlite     # Accounts, sessions, profiles
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Debug)]
struct EmberConfig {
    ember_root: Option<PathBuf>,
}

/// Get the global configuration path
fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ember").join("config.json"))
}

/// Load the persistent root from config file
pub fn load_persistent_root() -> Option<PathBuf> {
    let path = get_config_path()?;
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<EmberConfig>(&content) {
            Ok(config) => config.ember_root,
            Err(e) => {
                warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file at {:?}: {}", path, e);
            None
        }
    }
}

/// Save a path as the persistent Ember root
pub fn save_persistent_root(root: PathBuf) -> anyhow::Result<()> {
    let path = get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config dir"))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = EmberConfig {
        ember_root: Some(root),
    };
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(path, json)?;
    Ok(())
}

/// Get the EMBER_ROOT directory from environment, persistent config, or default
pub fn ember_root() -> PathBuf {
    // 1. Check environment variable
    if let Ok(val) = std::env::var("EMBER_ROOT") {
        return PathBuf::from(val);
    }

    // 2. Check persistent config
    if let Some(root) = load_persistent_root() {
        // Set env var so subprocesses see it too
        std::env::set_var("EMBER_ROOT", &root);
        return root;
    }

    // 3. Default fallback
    PathBuf::from("ember_data")
}

/// Set the EMBER_ROOT directory at runtime
pub fn set_ember_root(path: PathBuf) {
    info!("Setting EMBER_ROOT to: {:?}", path);
    std::env::set_var("EMBER_ROOT", path);
}

/// Room documents directory
pub fn rooms_dir() -> PathBuf {
    ember_root().join("rooms")
}

/// Blob storage subdirectory
pub fn blobs_dir() -> PathBuf {
    ember_root().join("blobs")
}

/// Blob metadata database path
pub fn blob_meta_path() -> PathBuf {
    blobs_dir().join("meta.sqlite")
}

/// Accounts and sessions database path
pub fn users_db_path() -> PathBuf {
    ember_root().join("users.sqlite")
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &PathBuf) -> anyhow::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Initialize the complete directory structure
/// Call this once at server startup before any other operations
pub fn init_structure() -> anyhow::Result<PathBuf> {
    let root = ember_root();

    // Ensure root exists first
    ensure_dir(&root)?;

    ensure_dir(&rooms_dir())?;
    ensure_dir(&blobs_dir())?;

    // Canonicalize for absolute path
    let canonical = std::fs::canonicalize(&root).unwrap_or_else(|_| root.clone());

    info!("Ember directory structure initialized at: {:?}", canonical);

    Ok(canonical)
}

/// Ensure a file's parent directory exists
pub fn ensure_parent(path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(&parent.to_path_buf())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_structure_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("EMBER_ROOT", dir.path());

        let root = ember_root();
        assert!(rooms_dir().starts_with(&root));
        assert!(blobs_dir().starts_with(&root));
        assert!(blob_meta_path().starts_with(blobs_dir()));
        assert!(users_db_path().starts_with(&root));

        let canonical = init_structure().unwrap();
        assert!(canonical.join("rooms").exists());
        assert!(canonical.join("blobs").exists());

        std::env::remove_var("EMBER_ROOT");
    }
}
