//! Structural comparison of two snapshots.
//!
//! Used only to report change; merge decisions never depend on it. An entity is
//! "modified" when its serialized form differs; `last_updated` lives on the
//! snapshot, not on entities, so it never counts as a change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Column, SchemaSnapshot, Table};

/// Added, removed and modified entity ids of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl EntityChanges {
    /// Returns true if nothing was added, removed or modified.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changed entities.
    pub fn len(&self) -> usize {
        self.added
            .len()
            .saturating_add(self.removed.len())
            .saturating_add(self.modified.len())
    }
}

/// Column changes within one table, reported by column name.
pub type ColumnChanges = EntityChanges;

/// Structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Table ids
    pub tables: EntityChanges,
    /// Column names keyed by owning table id; only tables with changes appear
    pub columns: BTreeMap<String, ColumnChanges>,
    /// Relationship ids
    pub relationships: EntityChanges,
}

/// Counts for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_modified: usize,
    pub columns_added: usize,
    pub columns_removed: usize,
    pub columns_modified: usize,
    pub relationships_added: usize,
    pub relationships_removed: usize,
    pub relationships_modified: usize,
}

impl SchemaDiff {
    /// Returns true if the two snapshots are structurally identical.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty() && self.relationships.is_empty()
    }

    /// Change counts.
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary {
            tables_added: self.tables.added.len(),
            tables_removed: self.tables.removed.len(),
            tables_modified: self.tables.modified.len(),
            relationships_added: self.relationships.added.len(),
            relationships_removed: self.relationships.removed.len(),
            relationships_modified: self.relationships.modified.len(),
            ..DiffSummary::default()
        };
        for changes in self.columns.values() {
            summary.columns_added = summary.columns_added.saturating_add(changes.added.len());
            summary.columns_removed = summary.columns_removed.saturating_add(changes.removed.len());
            summary.columns_modified = summary
                .columns_modified
                .saturating_add(changes.modified.len());
        }
        summary
    }
}

fn serialized_differs<T: Serialize>(old: &T, new: &T) -> bool {
    match (serde_json::to_value(old), serde_json::to_value(new)) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

fn diff_columns(old: Option<&Table>, new: Option<&Table>) -> ColumnChanges {
    let empty: &[Column] = &[];
    let old_columns = old.map_or(empty, |t| t.columns.as_slice());
    let new_columns = new.map_or(empty, |t| t.columns.as_slice());

    let mut changes = ColumnChanges::default();
    for column in new_columns {
        match old_columns.iter().find(|c| c.id == column.id) {
            None => changes.added.push(column.name.clone()),
            Some(previous) if serialized_differs(previous, column) => {
                changes.modified.push(column.name.clone());
            }
            Some(_) => {}
        }
    }
    for column in old_columns {
        if !new_columns.iter().any(|c| c.id == column.id) {
            changes.removed.push(column.name.clone());
        }
    }
    changes
}

/// Computes the structural difference from `old` to `new`.
pub fn diff(old: &SchemaSnapshot, new: &SchemaSnapshot) -> SchemaDiff {
    let mut result = SchemaDiff::default();

    for table in &new.tables {
        let previous = old.table_by_id(&table.id);
        match previous {
            None => result.tables.added.push(table.id.clone()),
            Some(previous) if serialized_differs(previous, table) => {
                result.tables.modified.push(table.id.clone());
            }
            Some(_) => {}
        }
        let columns = diff_columns(previous, Some(table));
        if !columns.is_empty() {
            result.columns.insert(table.id.clone(), columns);
        }
    }

    for table in &old.tables {
        if new.table_by_id(&table.id).is_none() {
            result.tables.removed.push(table.id.clone());
            let columns = diff_columns(Some(table), None);
            if !columns.is_empty() {
                result.columns.insert(table.id.clone(), columns);
            }
        }
    }

    for relationship in &new.relationships {
        match old.relationships.iter().find(|r| r.id == relationship.id) {
            None => result.relationships.added.push(relationship.id.clone()),
            Some(previous) if previous != relationship => {
                result.relationships.modified.push(relationship.id.clone());
            }
            Some(_) => {}
        }
    }
    for relationship in &old.relationships {
        if !new.relationships.iter().any(|r| r.id == relationship.id) {
            result.relationships.removed.push(relationship.id.clone());
        }
    }

    result
}
