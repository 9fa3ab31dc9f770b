//! Extractor serving a fixed raw schema.

use async_trait::async_trait;

use super::{ExtractionOptions, SchemaExtractor};
use crate::error::Result;
use crate::observation::{ObservedRelationship, RawSchema};

/// Serves a pre-loaded [`RawSchema`], e.g. one read from a catalog dump.
///
/// Relationships carried by the raw schema are served through
/// `extract_relationships` rather than `extract_raw_schema`, matching how a
/// live extractor reports them separately.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaExtractor {
    raw: Option<RawSchema>,
}

impl StaticSchemaExtractor {
    /// Creates an extractor that always returns `raw`.
    pub fn new(raw: RawSchema) -> Self {
        Self { raw: Some(raw) }
    }

    /// Creates an extractor that never observes anything.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaExtractor for StaticSchemaExtractor {
    async fn extract_raw_schema(&self, options: &ExtractionOptions) -> Result<Option<RawSchema>> {
        Ok(self.raw.as_ref().map(|raw| {
            let mut raw = RawSchema {
                relationships: Vec::new(),
                ..raw.clone()
            };
            if raw.database_id.is_empty() {
                raw.database_id.clone_from(&options.database_id);
            }
            if !options.include_descriptions {
                for table in &mut raw.tables {
                    table.description = None;
                    for column in &mut table.columns {
                        column.description = None;
                    }
                }
            }
            raw
        }))
    }

    async fn extract_relationships(
        &self,
        options: &ExtractionOptions,
    ) -> Result<Vec<ObservedRelationship>> {
        if !options.include_relationships {
            return Ok(Vec::new());
        }
        Ok(self
            .raw
            .as_ref()
            .map(|raw| raw.relationships.clone())
            .unwrap_or_default())
    }
}
