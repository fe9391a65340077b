use bytes::Bytes;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{BlobError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// SHA-256 content hash, doubling as the storage key.
    pub key: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub size: u64,
}

/// SHA-256 hash of a byte slice, lowercase hex
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct BlobStore {
    blob_dir: PathBuf,
    meta_conn: Arc<Mutex<Connection>>,
}

impl BlobStore {
    pub async fn new(blob_dir: PathBuf, meta_db_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&blob_dir).await?;
        if let Some(parent) = meta_db_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&meta_db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value JSON
            )",
            [],
        )?;

        Ok(Self {
            blob_dir,
            meta_conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Store a blob under its content hash. Re-uploading identical content is
    /// a no-op beyond refreshing the metadata row.
    pub async fn put(
        &self,
        data: Bytes,
        content_type: Option<String>,
        filename: Option<String>,
    ) -> Result<BlobMetadata> {
        let key = content_hash(&data);

        let meta = BlobMetadata {
            key: key.clone(),
            content_type,
            filename,
            size: data.len() as u64,
        };

        // Write file atomically
        let file_path = self.file_path(&key);
        let temp_folder = self.blob_dir.join("tmp");
        atomic_write(&file_path, &data, &temp_folder).await?;

        // Update metadata
        {
            let conn = self.meta_conn.lock().await;
            let val_str = serde_json::to_string(&meta)?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
                params![key, val_str],
            )?;
        }

        debug!("Stored blob {} ({} bytes)", meta.key, meta.size);

        Ok(meta)
    }

    pub async fn get(&self, key: &str) -> Result<Option<(Bytes, BlobMetadata)>> {
        let meta = match self.get_meta(key).await? {
            Some(meta) => meta,
            None => return Ok(None),
        };

        let file_path = self.file_path(key);
        if !fs::try_exists(&file_path).await? {
            return Ok(None);
        }

        let data = fs::read(&file_path).await?;

        // The key is the content hash, so a disk-level corruption is detectable
        let actual = content_hash(&data);
        if actual != meta.key {
            return Err(BlobError::ChecksumMismatch {
                key: key.to_string(),
                expected: meta.key,
                actual,
            });
        }

        Ok(Some((Bytes::from(data), meta)))
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<BlobMetadata>> {
        let conn = self.meta_conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;

        if let Some(row) = rows.next()? {
            let value_str: String = row.get(0)?;
            Ok(Some(serde_json::from_str::<BlobMetadata>(&value_str)?))
        } else {
            Ok(None)
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        {
            let conn = self.meta_conn.lock().await;
            conn.execute("DELETE FROM meta WHERE key = ?", params![key])?;
        }

        let file_path = self.file_path(key);
        if fs::try_exists(&file_path).await? {
            fs::remove_file(&file_path).await?;
        }

        Ok(())
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let conn = self.meta_conn.lock().await;
        let mut stmt = conn.prepare("SELECT key FROM meta")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Keys are hex hashes, safe as filenames on every platform
        self.blob_dir.join(key)
    }
}

pub async fn atomic_write(
    dest: &std::path::Path,
    data: &[u8],
    temp_folder: &std::path::Path,
) -> Result<std::fs::Metadata> {
    fs::create_dir_all(temp_folder).await?;

    let temp_name = format!("tmp_{}", uuid::Uuid::new_v4());
    let temp_path = temp_folder.join(temp_name);

    fs::write(&temp_path, data).await?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    fs::rename(&temp_path, dest).await?;

    let metadata = std::fs::metadata(dest)?;
    Ok(metadata)
}
