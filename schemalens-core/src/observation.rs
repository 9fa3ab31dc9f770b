//! Observation input types.
//!
//! Every signal about the schema arrives as an [`Observation`]: either a raw
//! extraction from the page or an incremental upsert derived from a query.
//! Ids are optional everywhere; a missing id means "match by name or treat
//! as new", and the merger generates a synthetic id for new entities.

use serde::{Deserialize, Serialize};

use crate::models::{Cardinality, DataType};

/// A column as seen by one observation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedColumn {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub examples: Vec<serde_json::Value>,
}

impl ObservedColumn {
    /// Creates a name-only column of unknown type.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the data type.
    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Builder method to set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A table as seen by one observation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedTable {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ObservedColumn>,
}

impl ObservedTable {
    /// Creates a name-only table with no columns.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder method to add a column.
    pub fn with_column(mut self, column: ObservedColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder method to set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Reference to a table or column, either by id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRef {
    Id(String),
    Name(String),
}

/// A relationship as reported by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRelationship {
    #[serde(default)]
    pub id: Option<String>,
    pub source_table: EntityRef,
    pub source_column: EntityRef,
    pub target_table: EntityRef,
    pub target_column: EntityRef,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl ObservedRelationship {
    /// Creates a relationship referencing all endpoints by name.
    pub fn by_name(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source_table: EntityRef::Name(source_table.into()),
            source_column: EntityRef::Name(source_column.into()),
            target_table: EntityRef::Name(target_table.into()),
            target_column: EntityRef::Name(target_column.into()),
            cardinality: Cardinality::OneToMany,
        }
    }
}

/// The raw result of a page extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSchema {
    pub database_id: String,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub tables: Vec<ObservedTable>,
    #[serde(default)]
    pub relationships: Vec<ObservedRelationship>,
}

/// A partial signal about the schema, ready to be merged.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A full extraction from the external schema browser
    Extracted(RawSchema),
    /// Incremental table/column upserts learned from queries and results
    Upsert(Vec<ObservedTable>),
}

impl Observation {
    /// Tables carried by this observation.
    pub fn tables(&self) -> &[ObservedTable] {
        match self {
            Observation::Extracted(raw) => &raw.tables,
            Observation::Upsert(tables) => tables,
        }
    }

    /// Relationships carried by this observation.
    pub fn relationships(&self) -> &[ObservedRelationship] {
        match self {
            Observation::Extracted(raw) => &raw.relationships,
            Observation::Upsert(_) => &[],
        }
    }

    /// Database display name, when the observation carries one.
    pub fn database_name(&self) -> Option<&str> {
        match self {
            Observation::Extracted(raw) => raw.database_name.as_deref(),
            Observation::Upsert(_) => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::Extracted(_) => "extraction",
            Observation::Upsert(_) => "upsert",
        }
    }

    /// Returns true if the observation carries no tables and no relationships.
    pub fn is_empty(&self) -> bool {
        self.tables().is_empty() && self.relationships().is_empty()
    }
}
