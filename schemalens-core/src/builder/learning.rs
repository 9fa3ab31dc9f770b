//! Translation of an executed query into an upsert observation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::InferenceConfig;
use crate::inference::infer_column;
use crate::observation::{Observation, ObservedColumn, ObservedTable};
use crate::references::{extract_references, parse_qualified_name};

/// Result grid returned by an executed query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column headers in result order
    pub columns: Vec<String>,
    /// Rows as JSON arrays (positional) or objects (keyed by header)
    #[serde(default)]
    pub rows: Vec<Value>,
}

impl ResultSet {
    /// Creates a result set from headers and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Value>) -> Self {
        Self { columns, rows }
    }

    fn value_at(row: &Value, index: usize, header: &str) -> Value {
        match row {
            Value::Array(values) => values.get(index).cloned().unwrap_or(Value::Null),
            Value::Object(map) => map.get(header).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Values of one column across the first `limit` rows.
    pub fn samples(&self, index: usize, limit: usize) -> Vec<Value> {
        let header = self.columns.get(index).map_or("", String::as_str);
        self.rows
            .iter()
            .take(limit)
            .map(|row| Self::value_at(row, index, header))
            .collect()
    }
}

/// A query the builder should learn from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LearnRequest {
    pub sql: String,
    #[serde(default)]
    pub result: Option<ResultSet>,
}

impl LearnRequest {
    /// Creates a request carrying only SQL text.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            result: None,
        }
    }

    /// Builder method to attach the query's results.
    pub fn with_result(mut self, result: ResultSet) -> Self {
        self.result = Some(result);
        self
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn table_entry<'a>(tables: &'a mut Vec<ObservedTable>, name: &str) -> &'a mut ObservedTable {
    let index = match tables.iter().position(|t| t.name.eq_ignore_ascii_case(name)) {
        Some(index) => index,
        None => {
            tables.push(ObservedTable::named(name));
            tables.len().saturating_sub(1)
        }
    };
    &mut tables[index]
}

/// Builds the upsert observation for one executed query.
///
/// Referenced tables and qualified columns come from the SQL text. Result
/// headers of the form `table.column` or `alias.column` contribute sampled
/// types and examples; bare identifier headers are attributed to the table
/// when the query references exactly one.
pub(crate) fn observation_from_query(request: &LearnRequest, config: &InferenceConfig) -> Observation {
    let references = extract_references(&request.sql);
    let single_table = (references.len() == 1)
        .then(|| references.iter().next().map(|t| t.name.clone()))
        .flatten();

    let mut tables: Vec<ObservedTable> = references
        .iter()
        .map(|reference| ObservedTable {
            columns: reference
                .columns
                .iter()
                .map(ObservedColumn::named)
                .collect(),
            ..ObservedTable::named(reference.name.clone())
        })
        .collect();

    if let Some(result) = &request.result {
        for (index, header) in result.columns.iter().enumerate() {
            let target = match parse_qualified_name(header) {
                Some((qualifier, column)) => match references.resolve(&qualifier) {
                    Some(table) => Some((table.to_string(), column)),
                    // Unresolved qualifier in an aliased query: skip it.
                    None if references.has_aliases() => None,
                    None => Some((qualifier, column)),
                },
                None => {
                    let header = header.trim();
                    is_plain_identifier(header)
                        .then(|| single_table.clone().map(|t| (t, header.to_string())))
                        .flatten()
                }
            };
            let Some((table_name, column_name)) = target else {
                tracing::debug!(header = %header, "Result header not attributable to a table");
                continue;
            };

            let inferred = infer_column(&result.samples(index, config.max_samples), config);
            let column = ObservedColumn {
                data_type: inferred.data_type,
                is_nullable: inferred.is_nullable,
                examples: inferred.examples,
                ..ObservedColumn::named(column_name)
            };
            table_entry(&mut tables, &table_name).columns.push(column);
        }
    }

    Observation::Upsert(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use serde_json::json;

    fn config() -> InferenceConfig {
        InferenceConfig::default()
    }

    #[test]
    fn test_sql_only_upserts_referenced_tables() {
        let request = LearnRequest::new(
            "SELECT u.id, u.name FROM users u JOIN orders o ON u.id = o.user_id WHERE o.status = 'paid'",
        );
        let observation = observation_from_query(&request, &config());
        let tables = observation.tables();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "users");
        assert!(tables[1].columns.iter().any(|c| c.name == "user_id"));
        assert!(tables.iter().flat_map(|t| &t.columns).all(|c| c.data_type == DataType::Unknown));
    }

    #[test]
    fn test_qualified_headers_get_inferred_types() {
        let request = LearnRequest::new("SELECT orders.total, orders.placed_at FROM orders").with_result(
            ResultSet::new(
                vec!["orders.total".to_string(), "orders.placed_at".to_string()],
                vec![
                    json!([10, "2024-01-01"]),
                    json!([null, "2024-02-15"]),
                    json!([7, "2024-03-01"]),
                ],
            ),
        );
        let observation = observation_from_query(&request, &config());
        let orders = &observation.tables()[0];
        let total = orders.columns.iter().rev().find(|c| c.name == "total").unwrap();
        assert_eq!(total.data_type, DataType::Integer);
        assert!(total.is_nullable);
        assert_eq!(total.examples, vec![json!(10), json!(7)]);

        let placed = orders.columns.iter().rev().find(|c| c.name == "placed_at").unwrap();
        assert_eq!(placed.data_type, DataType::Date);
        assert!(!placed.is_nullable);
    }

    #[test]
    fn test_bare_headers_need_a_single_table() {
        let result = ResultSet::new(
            vec!["status".to_string(), "count(*)".to_string()],
            vec![json!({"status": "paid", "count(*)": 3})],
        );

        let single = LearnRequest::new("SELECT status, count(*) FROM orders GROUP BY status")
            .with_result(result.clone());
        let observation = observation_from_query(&single, &config());
        let orders = &observation.tables()[0];
        assert_eq!(orders.columns.len(), 1);
        assert_eq!(orders.columns[0].name, "status");
        assert_eq!(orders.columns[0].data_type, DataType::String);

        let joined = LearnRequest::new("SELECT status FROM orders JOIN users ON orders.user_id = users.id")
            .with_result(result);
        let observation = observation_from_query(&joined, &config());
        assert!(
            observation
                .tables()
                .iter()
                .flat_map(|t| &t.columns)
                .all(|c| c.name != "status")
        );
    }

    #[test]
    fn test_headers_for_unreferenced_tables_create_them() {
        let request = LearnRequest::new("not sql at all").with_result(ResultSet::new(
            vec!["invoices.amount".to_string()],
            vec![json!([1.5])],
        ));
        let observation = observation_from_query(&request, &config());
        assert_eq!(observation.tables().len(), 1);
        assert_eq!(observation.tables()[0].name, "invoices");
        assert_eq!(observation.tables()[0].columns[0].data_type, DataType::Number);
    }

    #[test]
    fn test_alias_qualified_headers_resolve_to_tables() {
        let request = LearnRequest::new("SELECT u.id, o.total FROM users u JOIN orders o ON o.user_id = u.id")
            .with_result(ResultSet::new(
                vec!["u.id".to_string(), "o.total".to_string(), "x.ghost".to_string()],
                vec![json!([1, 9.5, "a"]), json!([2, 3.25, "b"])],
            ));
        let observation = observation_from_query(&request, &config());
        let tables = observation.tables();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders"]);

        let id = tables[0].columns.iter().rev().find(|c| c.name == "id").unwrap();
        assert_eq!(id.data_type, DataType::Integer);
        let total = tables[1].columns.iter().rev().find(|c| c.name == "total").unwrap();
        assert_eq!(total.data_type, DataType::Number);
        assert!(tables.iter().flat_map(|t| &t.columns).all(|c| c.name != "ghost"));
    }

    #[test]
    fn test_missing_cells_count_as_null() {
        let result = ResultSet::new(vec!["t.a".to_string()], vec![json!([]), json!("scalar")]);
        assert_eq!(result.samples(0, 10), vec![Value::Null, Value::Null]);
        assert!(result.samples(0, 0).is_empty());
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("user_id"));
        assert!(is_plain_identifier("_x1"));
        assert!(!is_plain_identifier("count(*)"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier(""));
    }
}
