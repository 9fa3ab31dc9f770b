//! Explicit registry of builders, one per database id.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::SchemaBuilder;
use crate::adapters::{SchemaExtractor, SnapshotStore};
use crate::config::BuilderConfig;
use crate::error::{EntityKind, Result, SchemaError};

/// Owns the builders for every database id seen by the application.
///
/// Pass it through application context; there is no process-wide instance.
pub struct BuilderRegistry {
    store: Arc<dyn SnapshotStore>,
    extractor: Arc<dyn SchemaExtractor>,
    config: BuilderConfig,
    builders: RwLock<HashMap<String, Arc<SchemaBuilder>>>,
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BuilderRegistry {
    /// Creates an empty registry sharing one store, extractor and config.
    ///
    /// # Errors
    /// Returns `SchemaError::Configuration` for an invalid config.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        extractor: Arc<dyn SchemaExtractor>,
        config: BuilderConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            extractor,
            config,
            builders: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the builder for `database_id`, creating and initializing it if needed.
    ///
    /// # Errors
    /// Returns configuration or persistence errors from builder creation.
    pub async fn get_or_create(&self, database_id: &str) -> Result<Arc<SchemaBuilder>> {
        if let Some(builder) = self.builders.read().await.get(database_id) {
            return Ok(Arc::clone(builder));
        }

        let builder = {
            let mut builders = self.builders.write().await;
            match builders.get(database_id) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let builder = Arc::new(SchemaBuilder::new(
                        database_id,
                        Arc::clone(&self.store),
                        Arc::clone(&self.extractor),
                        self.config.clone(),
                    )?);
                    builders.insert(database_id.to_string(), Arc::clone(&builder));
                    tracing::debug!(database_id, "Registered schema builder");
                    builder
                }
            }
        };

        // Initialization is idempotent, so racing callers are harmless.
        builder.initialize().await?;
        Ok(builder)
    }

    /// Returns an existing builder.
    ///
    /// # Errors
    /// Returns `NotFound` if no builder exists for the id.
    pub async fn get(&self, database_id: &str) -> Result<Arc<SchemaBuilder>> {
        self.builders
            .read()
            .await
            .get(database_id)
            .cloned()
            .ok_or_else(|| SchemaError::not_found(EntityKind::Builder, database_id))
    }

    /// Shuts down and removes one builder.
    ///
    /// # Errors
    /// Returns `NotFound` if no builder exists for the id.
    pub async fn dispose(&self, database_id: &str) -> Result<()> {
        let builder = self
            .builders
            .write()
            .await
            .remove(database_id)
            .ok_or_else(|| SchemaError::not_found(EntityKind::Builder, database_id))?;
        builder.shutdown().await?;
        tracing::debug!(database_id, "Disposed schema builder");
        Ok(())
    }

    /// Shuts down and removes every builder.
    ///
    /// # Errors
    /// Returns the first shutdown error; every builder is still removed.
    pub async fn dispose_all(&self) -> Result<()> {
        let builders: Vec<Arc<SchemaBuilder>> = self
            .builders
            .write()
            .await
            .drain()
            .map(|(_, builder)| builder)
            .collect();
        let count = builders.len();

        let results = futures::future::join_all(builders.iter().map(|b| b.shutdown())).await;
        tracing::debug!(count, "Disposed all schema builders");
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Database ids with a registered builder, sorted.
    pub async fn database_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.builders.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
