//! Additive, non-destructive merging of observations into a snapshot.
//!
//! Rules, applied field by field:
//! - tables and columns are matched by id, falling back to a case-insensitive
//!   name match; unmatched ones are appended in full
//! - descriptions are filled only when empty, never blanked
//! - a column type moves from `Unknown` to a concrete type once; the first
//!   concrete classification is kept
//! - key and nullable flags are monotonic OR
//! - example values accumulate de-duplicated, capped at
//!   [`MAX_EXAMPLE_VALUES`](crate::models::MAX_EXAMPLE_VALUES)
//! - relationships are appended when their id (and endpoints) are new, and
//!   never modified
//! - `last_updated` advances only when something changed

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Column, Relationship, SchemaSnapshot, Table};
use crate::observation::{EntityRef, Observation, ObservedColumn, ObservedRelationship, ObservedTable};

/// Result of a merge: the new snapshot and whether anything changed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub snapshot: SchemaSnapshot,
    pub changed: bool,
}

/// Generates a synthetic id for an entity observed without one.
pub fn synthetic_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Merges an observation into a snapshot using the current time.
pub fn merge(existing: SchemaSnapshot, incoming: &Observation) -> SchemaSnapshot {
    merge_at(existing, incoming, Utc::now()).snapshot
}

/// Merges an observation into a snapshot, stamping changes with `now`.
pub fn merge_at(
    mut snapshot: SchemaSnapshot,
    incoming: &Observation,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let mut changed = false;

    if let Some(name) = incoming.database_name()
        && !name.trim().is_empty()
        && snapshot
            .database_name
            .as_deref()
            .is_none_or(|current| current.trim().is_empty())
    {
        snapshot.database_name = Some(name.to_string());
        changed = true;
    }

    for table in incoming.tables() {
        changed |= merge_table(&mut snapshot, table);
    }

    for relationship in incoming.relationships() {
        changed |= merge_relationship(&mut snapshot, relationship);
    }

    if changed {
        snapshot.touch(now);
    }

    tracing::debug!(
        database_id = %snapshot.database_id,
        kind = incoming.kind(),
        changed,
        "Merged observation"
    );

    MergeOutcome { snapshot, changed }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn fill_description(current: &mut Option<String>, incoming: Option<&str>) -> bool {
    let Some(incoming) = non_empty(incoming) else {
        return false;
    };
    if non_empty(current.as_deref()).is_some() {
        return false;
    }
    *current = Some(incoming.to_string());
    true
}

fn merge_table(snapshot: &mut SchemaSnapshot, incoming: &ObservedTable) -> bool {
    if incoming.name.trim().is_empty() {
        tracing::debug!("Skipping observed table without a name");
        return false;
    }

    let index = snapshot.find_table(non_empty(incoming.id.as_deref()), &incoming.name);
    match index.and_then(|i| snapshot.tables.get_mut(i)) {
        Some(table) => reconcile_table(table, incoming),
        None => {
            let id = non_empty(incoming.id.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| synthetic_id("tbl"));
            let mut table = Table::new(id, incoming.name.trim());
            fill_description(&mut table.description, incoming.description.as_deref());
            for column in &incoming.columns {
                merge_column(&mut table, column);
            }
            tracing::debug!(table = %table.name, columns = table.columns.len(), "Added table");
            snapshot.tables.push(table);
            true
        }
    }
}

fn reconcile_table(table: &mut Table, incoming: &ObservedTable) -> bool {
    let mut changed = fill_description(&mut table.description, incoming.description.as_deref());
    for column in &incoming.columns {
        changed |= merge_column(table, column);
    }
    changed
}

fn merge_column(table: &mut Table, incoming: &ObservedColumn) -> bool {
    if incoming.name.trim().is_empty() {
        tracing::debug!(table = %table.name, "Skipping observed column without a name");
        return false;
    }

    let index = table.find_column(non_empty(incoming.id.as_deref()), &incoming.name);
    let table_name = table.name.clone();
    match index.and_then(|i| table.columns.get_mut(i)) {
        Some(column) => reconcile_column(&table_name, column, incoming),
        None => {
            let id = non_empty(incoming.id.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| synthetic_id("col"));
            let mut column = Column::new(id, incoming.name.trim());
            reconcile_column(&table_name, &mut column, incoming);
            tracing::debug!(table = %table_name, column = %column.name, data_type = %column.data_type, "Added column");
            table.columns.push(column);
            true
        }
    }
}

fn reconcile_column(table_name: &str, column: &mut Column, incoming: &ObservedColumn) -> bool {
    let mut changed = false;

    if column.data_type.is_unknown() && !incoming.data_type.is_unknown() {
        column.data_type = incoming.data_type;
        changed = true;
    } else if !incoming.data_type.is_unknown() && column.data_type != incoming.data_type {
        tracing::debug!(
            table = table_name,
            column = %column.name,
            kept = %column.data_type,
            observed = %incoming.data_type,
            "Keeping first concrete type classification"
        );
    }

    changed |= fill_description(&mut column.description, incoming.description.as_deref());

    if incoming.is_primary_key && !column.is_primary_key {
        column.is_primary_key = true;
        changed = true;
    }
    if incoming.is_foreign_key && !column.is_foreign_key {
        column.is_foreign_key = true;
        changed = true;
    }
    if incoming.is_nullable && !column.is_nullable {
        column.is_nullable = true;
        changed = true;
    }

    changed |= column.add_examples(&incoming.examples);
    changed
}

fn resolve_table(snapshot: &SchemaSnapshot, reference: &EntityRef) -> Option<usize> {
    match reference {
        EntityRef::Id(id) => snapshot.tables.iter().position(|t| &t.id == id),
        EntityRef::Name(name) => snapshot
            .tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name.trim())),
    }
}

fn resolve_column(table: &Table, reference: &EntityRef) -> Option<String> {
    let column = match reference {
        EntityRef::Id(id) => table.column_by_id(id),
        EntityRef::Name(name) => table.column_by_name(name.trim()),
    };
    column.map(|c| c.id.clone())
}

fn resolve_endpoint(
    snapshot: &SchemaSnapshot,
    table: &EntityRef,
    column: &EntityRef,
) -> Option<(String, String)> {
    let table = resolve_table(snapshot, table).and_then(|i| snapshot.tables.get(i))?;
    let column_id = resolve_column(table, column)?;
    Some((table.id.clone(), column_id))
}

fn merge_relationship(snapshot: &mut SchemaSnapshot, incoming: &ObservedRelationship) -> bool {
    let source = resolve_endpoint(snapshot, &incoming.source_table, &incoming.source_column);
    let target = resolve_endpoint(snapshot, &incoming.target_table, &incoming.target_column);
    let (Some((source_table_id, source_column_id)), Some((target_table_id, target_column_id))) =
        (source, target)
    else {
        tracing::debug!(?incoming, "Skipping relationship with unresolved endpoints");
        return false;
    };

    let id = non_empty(incoming.id.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "rel_{}_{}_{}_{}",
                source_table_id, source_column_id, target_table_id, target_column_id
            )
        });

    let relationship = Relationship {
        id,
        source_table_id,
        source_column_id,
        target_table_id,
        target_column_id,
        cardinality: incoming.cardinality,
    };

    let exists = snapshot
        .relationships
        .iter()
        .any(|r| r.id == relationship.id || r.same_endpoints(&relationship));
    if exists {
        return false;
    }

    tracing::debug!(relationship = %relationship.id, "Added relationship");
    snapshot.relationships.push(relationship);
    true
}
