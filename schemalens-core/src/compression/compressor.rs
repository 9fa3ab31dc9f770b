//! Budgeted projection of a snapshot.
//!
//! Tables named by the caller sort first, columns sort keys-first, and the
//! result is truncated to the configured counts. When the rendered text is
//! still over the token budget, detail is shed in a fixed order:
//! 1. relationships are capped
//! 2. unreferenced tables are dropped from the tail
//! 3. columns are trimmed by ~30% per round, never below the key columns
//! 4. remaining tables are dropped from the tail down to one
//!
//! Relationships are cleared last if the single remaining table is still over.

use crate::models::{Column, Relationship, SchemaSnapshot, Table};

use super::config::CompressionOptions;
use super::models::{
    CompressedColumn, CompressedRelationship, CompressedSchema, CompressedTable, CompressionReport,
};

/// Minimum number of relationships kept by the first shedding step.
const MIN_RELATIONSHIPS: usize = 5;

struct Candidate<'a> {
    table: &'a Table,
    referenced: bool,
    columns: Vec<&'a Column>,
}

impl Candidate<'_> {
    fn column_floor(&self) -> usize {
        self.columns.iter().filter(|c| c.is_key()).count().max(1)
    }
}

struct Projection<'a> {
    tables: Vec<Candidate<'a>>,
    relationships: Vec<&'a Relationship>,
}

impl<'a> Projection<'a> {
    fn candidate(&self, table_id: &str) -> Option<&Candidate<'a>> {
        self.tables.iter().find(|c| c.table.id == table_id)
    }

    /// Endpoint names come from the full table, so a column cut by the
    /// per-table limit still names its relationship.
    fn endpoint_names(&self, table_id: &str, column_id: &str) -> Option<(String, String)> {
        let candidate = self.candidate(table_id)?;
        let column = candidate.table.column_by_id(column_id)?;
        Some((candidate.table.name.clone(), column.name.clone()))
    }

    /// Drops relationships whose endpoint tables are no longer projected.
    fn prune_relationships(&mut self) {
        let tables = &self.tables;
        let survives = |table_id: &str| tables.iter().any(|c| c.table.id == table_id);
        self.relationships
            .retain(|r| survives(&r.source_table_id) && survives(&r.target_table_id));
    }

    fn render(&self) -> CompressedSchema {
        let tables = self
            .tables
            .iter()
            .map(|candidate| CompressedTable {
                name: candidate.table.name.clone(),
                columns: candidate
                    .columns
                    .iter()
                    .map(|c| CompressedColumn {
                        name: c.name.clone(),
                        data_type: c.data_type,
                        is_primary_key: c.is_primary_key,
                        is_foreign_key: c.is_foreign_key,
                    })
                    .collect(),
            })
            .collect();

        let relationships = self
            .relationships
            .iter()
            .filter_map(|r| {
                let (source_table, source_column) =
                    self.endpoint_names(&r.source_table_id, &r.source_column_id)?;
                let (target_table, target_column) =
                    self.endpoint_names(&r.target_table_id, &r.target_column_id)?;
                Some(CompressedRelationship {
                    source_table,
                    source_column,
                    target_table,
                    target_column,
                    cardinality: r.cardinality,
                })
            })
            .collect();

        CompressedSchema {
            tables,
            relationships,
        }
    }

    fn cost(&self) -> usize {
        self.render().estimated_tokens()
    }
}

/// Primary keys first, then foreign keys, then the rest; stable otherwise.
fn ordered_columns(table: &Table) -> Vec<&Column> {
    let mut columns: Vec<&Column> = table.columns.iter().collect();
    columns.sort_by_key(|c| {
        if c.is_primary_key {
            0
        } else if c.is_foreign_key {
            1
        } else {
            2
        }
    });
    columns
}

fn shed(projection: &mut Projection<'_>, budget: usize) -> usize {
    let mut cost = projection.cost();

    // (a) cap relationships relative to how far over budget we are
    let total = projection.relationships.len();
    if cost > budget && total > 0 {
        let keep = total
            .saturating_mul(budget)
            .checked_div(cost.saturating_mul(2))
            .unwrap_or(0)
            .max(MIN_RELATIONSHIPS);
        if keep < total {
            projection.relationships.truncate(keep);
            cost = projection.cost();
            tracing::debug!(kept = keep, dropped = total.saturating_sub(keep), cost, "Capped relationships");
        }
    }

    // (b) drop unreferenced tables from the tail
    while cost > budget && projection.tables.len() > 1 {
        let Some(index) = projection.tables.iter().rposition(|c| !c.referenced) else {
            break;
        };
        let dropped = projection.tables.remove(index);
        projection.prune_relationships();
        cost = projection.cost();
        tracing::debug!(table = %dropped.table.name, cost, "Dropped unreferenced table");
    }

    // (c) trim columns by ~30% per round, keeping key columns
    while cost > budget {
        let mut trimmed = false;
        for candidate in &mut projection.tables {
            let len = candidate.columns.len();
            let target = (len.saturating_mul(7) / 10).max(candidate.column_floor());
            if target < len {
                candidate.columns.truncate(target);
                trimmed = true;
            }
        }
        if !trimmed {
            break;
        }
        projection.prune_relationships();
        cost = projection.cost();
        tracing::debug!(cost, "Trimmed columns");
    }

    // (d) drop any remaining tables down to one
    while cost > budget && projection.tables.len() > 1 {
        if let Some(dropped) = projection.tables.pop() {
            tracing::debug!(table = %dropped.table.name, "Dropped table to meet budget");
        }
        projection.prune_relationships();
        cost = projection.cost();
    }

    if cost > budget && !projection.relationships.is_empty() {
        projection.relationships.clear();
        cost = projection.cost();
    }

    cost
}

/// Compresses a snapshot and reports what was shed.
pub fn compress_with_report<S: AsRef<str>>(
    snapshot: &SchemaSnapshot,
    referenced_tables: &[S],
    options: &CompressionOptions,
) -> (CompressedSchema, CompressionReport) {
    let is_referenced = |name: &str| {
        referenced_tables
            .iter()
            .any(|r| r.as_ref().trim().eq_ignore_ascii_case(name))
    };

    let mut tables: Vec<Candidate<'_>> = snapshot
        .tables
        .iter()
        .map(|table| Candidate {
            table,
            referenced: options.prioritize_referenced && is_referenced(&table.name),
            columns: ordered_columns(table),
        })
        .collect();
    if options.prioritize_referenced {
        tables.sort_by_key(|c| !c.referenced);
    }
    tables.truncate(options.max_tables);
    for candidate in &mut tables {
        candidate.columns.truncate(options.max_columns_per_table);
    }

    let relationships: Vec<&Relationship> = if options.include_relationships {
        snapshot.relationships.iter().collect()
    } else {
        Vec::new()
    };
    let relationships_total = relationships.len();

    let mut projection = Projection {
        tables,
        relationships,
    };
    projection.prune_relationships();

    let estimated_tokens = shed(&mut projection, options.max_tokens);
    if estimated_tokens > options.max_tokens {
        tracing::warn!(
            estimated_tokens,
            max_tokens = options.max_tokens,
            "Compressed schema is at its floor and still exceeds the token budget"
        );
    }

    let compressed = projection.render();
    let report = CompressionReport {
        tables_total: snapshot.tables.len(),
        tables_kept: compressed.tables.len(),
        columns_total: snapshot.stats().columns,
        columns_kept: compressed.column_count(),
        relationships_total,
        relationships_kept: compressed.relationships.len(),
        estimated_tokens,
        max_tokens: options.max_tokens,
    };

    tracing::debug!(
        database_id = %snapshot.database_id,
        tables = report.tables_kept,
        columns = report.columns_kept,
        relationships = report.relationships_kept,
        estimated_tokens,
        "Compressed schema"
    );

    (compressed, report)
}

/// Compresses a snapshot to fit the options.
///
/// # Example
/// ```rust
/// use schemalens_core::compression::{compress, CompressionOptions};
/// use schemalens_core::models::{Column, DataType, SchemaSnapshot, Table};
///
/// let mut snapshot = SchemaSnapshot::new("db1");
/// snapshot.tables.push(
///     Table::new("t1", "users").with_column(Column::new("c1", "id").with_type(DataType::Integer).primary_key()),
/// );
///
/// let compressed = compress(&snapshot, &["users"], &CompressionOptions::default());
/// assert_eq!(compressed.to_text(), "Table: users\n  id (integer) [PK]\n");
/// ```
pub fn compress<S: AsRef<str>>(
    snapshot: &SchemaSnapshot,
    referenced_tables: &[S],
    options: &CompressionOptions,
) -> CompressedSchema {
    compress_with_report(snapshot, referenced_tables, options).0
}
