//! Compressed schema projection and its text rendering.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

use crate::models::{Cardinality, DataType};

/// Approximate token count of a text: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// A column reduced to name, type and key flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedColumn {
    pub name: String,
    pub data_type: DataType,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

/// A table reduced to its name and retained columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedTable {
    pub name: String,
    pub columns: Vec<CompressedColumn>,
}

/// A relationship expressed by table and column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedRelationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub cardinality: Cardinality,
}

/// Size-bounded projection of a snapshot. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressedSchema {
    pub tables: Vec<CompressedTable>,
    pub relationships: Vec<CompressedRelationship>,
}

impl CompressedSchema {
    /// Returns true if no table survived.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of retained columns.
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Renders the flat text form handed to prompt construction.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Estimated token cost of the rendered text.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.to_text())
    }
}

impl fmt::Display for CompressedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.data_type)?;
        match (self.is_primary_key, self.is_foreign_key) {
            (true, true) => f.write_str(" [PK,FK]"),
            (true, false) => f.write_str(" [PK]"),
            (false, true) => f.write_str(" [FK]"),
            (false, false) => Ok(()),
        }
    }
}

impl fmt::Display for CompressedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (index, table) in self.tables.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            writeln!(out, "Table: {}", table.name)?;
            for column in &table.columns {
                writeln!(out, "  {}", column)?;
            }
        }

        if !self.relationships.is_empty() {
            if !self.tables.is_empty() {
                out.push('\n');
            }
            out.push_str("Relationships:\n");
            for rel in &self.relationships {
                writeln!(
                    out,
                    "  {}.{} -> {}.{} ({})",
                    rel.source_table, rel.source_column, rel.target_table, rel.target_column, rel.cardinality
                )?;
            }
        }

        f.write_str(&out)
    }
}

/// What a compression run kept and shed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompressionReport {
    pub tables_total: usize,
    pub tables_kept: usize,
    pub columns_total: usize,
    pub columns_kept: usize,
    pub relationships_total: usize,
    pub relationships_kept: usize,
    pub estimated_tokens: usize,
    pub max_tokens: usize,
}

impl CompressionReport {
    /// Returns true if anything was shed.
    pub fn is_truncated(&self) -> bool {
        self.tables_kept < self.tables_total
            || self.columns_kept < self.columns_total
            || self.relationships_kept < self.relationships_total
    }

    /// Returns true if the rendered text fits the budget.
    pub fn within_budget(&self) -> bool {
        self.estimated_tokens <= self.max_tokens
    }
}
