//! Collaborator traits and their in-crate implementations.
//!
//! The engine talks to two collaborators it does not own:
//! - a [`SchemaExtractor`] that observes the raw schema from somewhere outside
//!   (a page scrape, a catalog dump)
//! - a [`SnapshotStore`] that durably keeps one snapshot per database id
//!
//! Both traits are object-safe so builders can hold them as `Arc<dyn ...>`.

mod json_file;
mod memory;
mod static_extractor;

pub use json_file::JsonFileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use static_extractor::StaticSchemaExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, Result, SchemaError};
use crate::models::SchemaSnapshot;
use crate::observation::{ObservedRelationship, RawSchema};

/// Options passed through to the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOptions {
    /// Database the extraction is for
    pub database_id: String,
    /// Ask the extractor for table and column descriptions
    pub include_descriptions: bool,
    /// Ask the extractor for relationships
    pub include_relationships: bool,
}

impl ExtractionOptions {
    /// Creates options for a database id with everything enabled.
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            include_descriptions: true,
            include_relationships: true,
        }
    }

    /// Builder method to enable/disable descriptions.
    pub fn with_descriptions(mut self, enabled: bool) -> Self {
        self.include_descriptions = enabled;
        self
    }

    /// Builder method to enable/disable relationship extraction.
    pub fn with_relationships(mut self, enabled: bool) -> Self {
        self.include_relationships = enabled;
        self
    }
}

/// Source of raw schema observations.
///
/// Implementations may fail or return partial data; `Ok(None)` means
/// "nothing could be observed right now" and is not an error.
#[async_trait]
pub trait SchemaExtractor: Send + Sync {
    /// Observes tables and columns.
    ///
    /// # Errors
    /// Returns `SchemaError::Extraction` if the source could not be observed.
    async fn extract_raw_schema(&self, options: &ExtractionOptions) -> Result<Option<RawSchema>>;

    /// Observes relationships between tables.
    ///
    /// # Errors
    /// Returns `SchemaError::Extraction` if the source could not be observed.
    async fn extract_relationships(
        &self,
        options: &ExtractionOptions,
    ) -> Result<Vec<ObservedRelationship>>;
}

/// Durable key-value storage of snapshots keyed by database id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the snapshot for a database id, if one was saved.
    ///
    /// # Errors
    /// Returns `SchemaError::Persistence` if the store could not be read.
    async fn get_snapshot(&self, database_id: &str) -> Result<Option<SchemaSnapshot>>;

    /// Saves a snapshot, replacing any previous one for its database id.
    ///
    /// # Errors
    /// Returns `SchemaError::Persistence` if the write failed.
    async fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> Result<SchemaSnapshot>;

    /// Removes every stored snapshot.
    ///
    /// # Errors
    /// Returns `SchemaError::Persistence` if the store could not be cleared.
    async fn clear_all(&self) -> Result<()>;

    /// Loads a snapshot that must exist.
    ///
    /// # Errors
    /// Returns `SchemaError::NotFound` when nothing is stored for the id.
    async fn require_snapshot(&self, database_id: &str) -> Result<SchemaSnapshot> {
        self.get_snapshot(database_id)
            .await?
            .ok_or_else(|| SchemaError::not_found(EntityKind::Snapshot, database_id))
    }
}
