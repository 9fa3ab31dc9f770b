//! Snapshot store keeping one JSON document per database id in a directory.
//!
//! Documents are validated against the snapshot schema on both read and write.
//! With the `compressed-store` feature they are zstd-compressed on disk.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::SnapshotStore;
use crate::error::{Result, SchemaError};
use crate::models::SchemaSnapshot;
use crate::validation::{validate_and_parse_snapshot, validate_snapshot, validate_snapshot_document};

#[cfg(feature = "compressed-store")]
const EXTENSION: &str = ".snapshot.json.zst";
#[cfg(not(feature = "compressed-store"))]
const EXTENSION: &str = ".snapshot.json";

/// zstd compression level used for stored snapshots
#[cfg(feature = "compressed-store")]
const COMPRESSION_LEVEL: i32 = 3;

/// Directory-backed snapshot store.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    root: PathBuf,
}

impl JsonFileSnapshotStore {
    /// Creates a store rooted at `root`; the directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a store and makes sure its directory exists.
    ///
    /// # Errors
    /// Returns `SchemaError::Io` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root)
            .await
            .map_err(|e| SchemaError::Io {
                context: format!("Failed to create store directory {}", store.root.display()),
                source: e,
            })?;
        Ok(store)
    }

    /// Directory holding the snapshot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path used for a database id.
    ///
    /// Characters outside `[A-Za-z0-9_-]` are percent-encoded so distinct ids
    /// never share a file and ids cannot escape the root directory.
    pub fn path_for(&self, database_id: &str) -> PathBuf {
        let mut stem = String::with_capacity(database_id.len());
        for byte in database_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                stem.push(char::from(byte));
            } else {
                let _ = write!(stem, "%{:02X}", byte);
            }
        }
        stem.push_str(EXTENSION);
        self.root.join(stem)
    }
}

#[cfg(feature = "compressed-store")]
fn encode(json_data: &str) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = zstd::Encoder::new(Vec::new(), COMPRESSION_LEVEL)?;
    encoder.write_all(json_data.as_bytes())?;
    encoder.finish()
}

#[cfg(not(feature = "compressed-store"))]
fn encode(json_data: &str) -> std::io::Result<Vec<u8>> {
    Ok(json_data.as_bytes().to_vec())
}

#[cfg(feature = "compressed-store")]
fn decode(bytes: &[u8]) -> std::io::Result<String> {
    let raw = zstd::decode_all(bytes)?;
    String::from_utf8(raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(not(feature = "compressed-store"))]
fn decode(bytes: &[u8]) -> std::io::Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn get_snapshot(&self, database_id: &str) -> Result<Option<SchemaSnapshot>> {
        let path = self.path_for(database_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(database_id, path = %path.display(), "No stored snapshot");
                return Ok(None);
            }
            Err(e) => {
                return Err(SchemaError::persistence_failed(
                    format!("Failed to read {}", path.display()),
                    e,
                ));
            }
        };

        let json_data = decode(&bytes).map_err(|e| {
            SchemaError::persistence_failed(format!("Failed to decode {}", path.display()), e)
        })?;
        let snapshot = validate_and_parse_snapshot(&json_data).map_err(|e| {
            SchemaError::persistence_failed(format!("Invalid snapshot in {}", path.display()), e)
        })?;

        if snapshot.database_id != database_id {
            return Err(SchemaError::persistence_failed(
                format!("Snapshot in {} belongs to another database", path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "expected database id '{}', found '{}'",
                        database_id, snapshot.database_id
                    ),
                ),
            ));
        }

        tracing::debug!(database_id, tables = snapshot.tables.len(), "Loaded snapshot");
        Ok(Some(snapshot))
    }

    async fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> Result<SchemaSnapshot> {
        validate_snapshot(snapshot).map_err(|e| {
            SchemaError::persistence_failed("Refusing to save an inconsistent snapshot", e)
        })?;

        let json_value = serde_json::to_value(snapshot).map_err(|e| SchemaError::Serialization {
            context: format!("Failed to serialize snapshot '{}'", snapshot.database_id),
            source: e,
        })?;
        validate_snapshot_document(&json_value).map_err(|e| {
            SchemaError::persistence_failed("Snapshot failed document validation", e)
        })?;
        let json_data =
            serde_json::to_string_pretty(&json_value).map_err(|e| SchemaError::Serialization {
                context: format!("Failed to serialize snapshot '{}'", snapshot.database_id),
                source: e,
            })?;

        let bytes = encode(&json_data)
            .map_err(|e| SchemaError::persistence_failed("Snapshot compression failed", e))?;

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            SchemaError::persistence_failed(
                format!("Failed to create store directory {}", self.root.display()),
                e,
            )
        })?;

        let path = self.path_for(&snapshot.database_id);
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, bytes).await.map_err(|e| {
            SchemaError::persistence_failed(format!("Failed to write {}", staging.display()), e)
        })?;
        tokio::fs::rename(&staging, &path).await.map_err(|e| {
            SchemaError::persistence_failed(format!("Failed to replace {}", path.display()), e)
        })?;

        tracing::debug!(
            database_id = %snapshot.database_id,
            path = %path.display(),
            "Saved snapshot"
        );
        Ok(snapshot.clone())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(SchemaError::persistence_failed(
                    format!("Failed to list {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut removed = 0usize;
        loop {
            let entry = entries.next_entry().await.map_err(|e| {
                SchemaError::persistence_failed(format!("Failed to list {}", self.root.display()), e)
            })?;
            let Some(entry) = entry else {
                break;
            };
            let path = entry.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(EXTENSION));
            if !is_snapshot {
                continue;
            }
            tokio::fs::remove_file(&path).await.map_err(|e| {
                SchemaError::persistence_failed(format!("Failed to remove {}", path.display()), e)
            })?;
            removed = removed.saturating_add(1);
        }

        tracing::info!(removed, root = %self.root.display(), "Cleared stored snapshots");
        Ok(())
    }
}
