//! Core data models for the learned schema.
//!
//! A [`SchemaSnapshot`] is the unit that is persisted and versioned for one
//! database id. It owns its tables, each table owns its columns, and
//! relationships point at tables and columns by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, Result, SchemaError};

/// Current snapshot format version
pub const FORMAT_VERSION: &str = "1.0";

/// Maximum number of example values retained per column
pub const MAX_EXAMPLE_VALUES: usize = 10;

/// Coarse column type learned from observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Nothing concrete observed yet
    #[default]
    Unknown,
    /// Whole numbers
    Integer,
    /// Any numeric value
    Number,
    /// `true` / `false`
    Boolean,
    /// Dates and timestamps
    Date,
    /// Free text and anything unclassified
    String,
}

impl DataType {
    /// Returns true for `Unknown`.
    pub fn is_unknown(&self) -> bool {
        matches!(self, DataType::Unknown)
    }

    /// Lowercase tag used in rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Unknown => "unknown",
            DataType::Integer => "integer",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::String => "string",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Cardinality {
    #[serde(rename = "one-to-one")]
    OneToOne,
    #[default]
    #[serde(rename = "one-to-many")]
    OneToMany,
    #[serde(rename = "many-to-many")]
    ManyToMany,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "one-to-one"),
            Cardinality::OneToMany => write!(f, "one-to-many"),
            Cardinality::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// A column owned by exactly one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
}

impl Column {
    /// Creates a column of unknown type with no flags set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type: DataType::Unknown,
            description: None,
            is_primary_key: false,
            is_foreign_key: false,
            is_nullable: false,
            examples: Vec::new(),
        }
    }

    /// Builder method to set the data type.
    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Builder method to mark the column as primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Builder method to mark the column as foreign key.
    pub fn foreign_key(mut self) -> Self {
        self.is_foreign_key = true;
        self
    }

    /// Builder method to mark the column as nullable.
    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Returns true if the column is a primary or foreign key.
    pub fn is_key(&self) -> bool {
        self.is_primary_key || self.is_foreign_key
    }

    /// Appends example values, skipping duplicates and stopping at the cap.
    ///
    /// Returns true if at least one value was added.
    pub fn add_examples<'a, I>(&mut self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a serde_json::Value>,
    {
        let mut added = false;
        for value in values {
            if self.examples.len() >= MAX_EXAMPLE_VALUES {
                break;
            }
            if value.is_null() || self.examples.contains(value) {
                continue;
            }
            self.examples.push(value.clone());
            added = true;
        }
        added
    }
}

/// A table and the columns it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            columns: Vec::new(),
        }
    }

    /// Builder method to add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Looks up a column by id.
    pub fn column_by_id(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Looks up a column by name, ignoring case.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Finds a column by id, falling back to a case-insensitive name match.
    pub fn find_column(&self, id: Option<&str>, name: &str) -> Option<usize> {
        id.and_then(|id| self.columns.iter().position(|c| c.id == id))
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Looks up a column by name, failing with `NotFound`.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.column_by_name(name).ok_or_else(|| {
            SchemaError::not_found(EntityKind::Column, format!("{}.{}", self.name, name))
        })
    }

    /// Number of primary or foreign key columns.
    pub fn key_column_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_key()).count()
    }
}

/// A reference between two columns, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_table_id: String,
    pub source_column_id: String,
    pub target_table_id: String,
    pub target_column_id: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl Relationship {
    /// Returns true if either endpoint lives in the given table.
    pub fn touches_table(&self, table_id: &str) -> bool {
        self.source_table_id == table_id || self.target_table_id == table_id
    }

    /// Returns true if both relationships connect the same four endpoints.
    pub fn same_endpoints(&self, other: &Relationship) -> bool {
        self.source_table_id == other.source_table_id
            && self.source_column_id == other.source_column_id
            && self.target_table_id == other.target_table_id
            && self.target_column_id == other.target_column_id
    }
}

/// Entity counts for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SnapshotStats {
    pub tables: usize,
    pub columns: usize,
    pub relationships: usize,
}

/// The full learned schema of one database at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub format_version: String,
    pub database_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot for a database id.
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            database_id: database_id.into(),
            database_name: None,
            last_updated: Utc::now(),
            tables: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Returns true if no tables are known yet.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by id.
    pub fn table_by_id(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Looks up a table by name, ignoring case.
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Finds a table by id, falling back to a case-insensitive name match.
    pub fn find_table(&self, id: Option<&str>, name: &str) -> Option<usize> {
        id.and_then(|id| self.tables.iter().position(|t| t.id == id))
            .or_else(|| {
                self.tables
                    .iter()
                    .position(|t| t.name.eq_ignore_ascii_case(name))
            })
    }

    /// Looks up a table by name, failing with `NotFound`.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.table_by_name(name)
            .ok_or_else(|| SchemaError::not_found(EntityKind::Table, name))
    }

    /// Removes a table and every relationship that references it.
    pub fn remove_table(&mut self, table_id: &str) -> Result<Table> {
        let index = self
            .tables
            .iter()
            .position(|t| t.id == table_id)
            .ok_or_else(|| SchemaError::not_found(EntityKind::Table, table_id))?;
        let removed = self.tables.remove(index);
        self.relationships.retain(|r| !r.touches_table(table_id));
        Ok(removed)
    }

    /// Returns true if all four references of a relationship resolve.
    pub fn relationship_resolves(&self, relationship: &Relationship) -> bool {
        let resolves = |table_id: &str, column_id: &str| {
            self.table_by_id(table_id)
                .is_some_and(|t| t.column_by_id(column_id).is_some())
        };
        resolves(
            &relationship.source_table_id,
            &relationship.source_column_id,
        ) && resolves(
            &relationship.target_table_id,
            &relationship.target_column_id,
        )
    }

    /// Drops relationships whose references no longer resolve.
    ///
    /// Returns the number of relationships removed.
    pub fn prune_dangling_relationships(&mut self) -> usize {
        let before = self.relationships.len();
        let valid: Vec<Relationship> = self
            .relationships
            .iter()
            .filter(|r| self.relationship_resolves(r))
            .cloned()
            .collect();
        self.relationships = valid;
        before.saturating_sub(self.relationships.len())
    }

    /// Advances `last_updated`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Returns entity counts.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            tables: self.tables.len(),
            columns: self.tables.iter().map(|t| t.columns.len()).sum(),
            relationships: self.relationships.len(),
        }
    }

    /// Age of the snapshot relative to `now`; zero if `last_updated` is in the future.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.last_updated)
            .to_std()
            .unwrap_or_default()
    }
}
