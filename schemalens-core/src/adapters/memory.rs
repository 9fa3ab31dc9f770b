//! In-process snapshot store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SnapshotStore;
use crate::error::Result;
use crate::models::SchemaSnapshot;

/// Snapshot store backed by a map; contents live as long as the store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, SchemaSnapshot>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_snapshot(&self, database_id: &str) -> Result<Option<SchemaSnapshot>> {
        Ok(self.snapshots.read().await.get(database_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> Result<SchemaSnapshot> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.database_id.clone(), snapshot.clone());
        Ok(snapshot.clone())
    }

    async fn clear_all(&self) -> Result<()> {
        self.snapshots.write().await.clear();
        Ok(())
    }
}
