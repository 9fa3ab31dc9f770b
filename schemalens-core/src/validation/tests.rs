//! Tests for snapshot document and invariant validation.

use super::*;
use crate::models::*;
use serde_json::json;

fn setup() {
    let _ = initialize_snapshot_validator();
}

fn sample_snapshot() -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::new("db1");
    snapshot.database_name = Some("Shop".to_string());
    snapshot.tables.push(
        Table::new("t_users", "users")
            .with_description("Registered accounts")
            .with_column(Column::new("c_id", "id").with_type(DataType::Integer).primary_key())
            .with_column(Column::new("c_email", "email").with_type(DataType::String).nullable()),
    );
    snapshot.tables.push(
        Table::new("t_orders", "orders")
            .with_column(Column::new("c_uid", "user_id").with_type(DataType::Integer).foreign_key()),
    );
    snapshot.relationships.push(Relationship {
        id: "r1".to_string(),
        source_table_id: "t_orders".to_string(),
        source_column_id: "c_uid".to_string(),
        target_table_id: "t_users".to_string(),
        target_column_id: "c_id".to_string(),
        cardinality: Cardinality::OneToMany,
    });
    snapshot
}

#[test]
fn test_schema_initialization_success() {
    assert!(initialize_snapshot_validator().is_ok());
    assert!(initialize_snapshot_validator().is_ok());
}

#[test]
fn test_serialized_snapshot_passes() {
    setup();
    let value = serde_json::to_value(sample_snapshot()).expect("serialize");
    assert!(validate_snapshot_document(&value).is_ok());
}

#[test]
fn test_minimal_document_passes() {
    setup();
    let document = json!({
        "format_version": "1.0",
        "database_id": "db1",
        "last_updated": "2024-01-15T10:30:00Z"
    });
    assert!(validate_snapshot_document(&document).is_ok());
}

#[test]
fn test_missing_required_field_fails() {
    setup();
    let document = json!({
        "format_version": "1.0",
        "last_updated": "2024-01-15T10:30:00Z"
    });
    let result = validate_snapshot_document(&document);
    assert!(matches!(
        result,
        Err(ValidationError::ValidationFailed { error_count, .. }) if error_count >= 1
    ));
}

#[test]
fn test_invalid_data_type_fails() {
    setup();
    let document = json!({
        "format_version": "1.0",
        "database_id": "db1",
        "last_updated": "2024-01-15T10:30:00Z",
        "tables": [{
            "id": "t1",
            "name": "users",
            "columns": [{ "id": "c1", "name": "id", "data_type": "uuid" }]
        }]
    });
    assert!(validate_snapshot_document(&document).is_err());
}

#[test]
fn test_too_many_examples_fail() {
    setup();
    let examples: Vec<_> = (0..11).map(|i| json!(i)).collect();
    let document = json!({
        "format_version": "1.0",
        "database_id": "db1",
        "last_updated": "2024-01-15T10:30:00Z",
        "tables": [{
            "id": "t1",
            "name": "users",
            "columns": [{ "id": "c1", "name": "id", "data_type": "integer", "examples": examples }]
        }]
    });
    assert!(validate_snapshot_document(&document).is_err());
}

#[test]
fn test_unsupported_version_fails() {
    setup();
    let document = json!({
        "format_version": "2.0",
        "database_id": "db1",
        "last_updated": "2024-01-15T10:30:00Z"
    });
    let result = validate_snapshot_document(&document);
    assert!(matches!(
        result,
        Err(ValidationError::UnsupportedVersion { .. })
    ));
    if let Err(ValidationError::UnsupportedVersion { version, supported }) = result {
        assert_eq!(version, "2.0");
        assert!(supported.contains(&"1.0".to_string()));
    }
}

#[test]
fn test_missing_format_version_fails() {
    setup();
    let document = json!({ "database_id": "db1", "last_updated": "2024-01-15T10:30:00Z" });
    assert!(validate_snapshot_document(&document).is_err());
}

#[test]
fn test_valid_snapshot_invariants() {
    assert!(validate_snapshot(&sample_snapshot()).is_ok());
}

#[test]
fn test_duplicate_ids_are_reported() {
    let mut snapshot = sample_snapshot();
    snapshot.tables.push(Table::new("t_users", "people"));
    snapshot.tables[0]
        .columns
        .push(Column::new("c_id", "user_id"));

    match validate_snapshot(&snapshot) {
        Err(ValidationError::InvariantViolation { error_count, errors }) => {
            assert_eq!(error_count, 2);
            assert!(errors.iter().any(|e| e.contains("Duplicate table id 't_users'")));
            assert!(errors.iter().any(|e| e.contains("Duplicate column id 'c_id'")));
        }
        other => panic!("expected invariant violation, got {:?}", other),
    }
}

#[test]
fn test_dangling_relationship_is_reported() {
    let mut snapshot = sample_snapshot();
    snapshot.tables[1].columns.clear();
    let result = validate_snapshot(&snapshot);
    assert!(matches!(
        result,
        Err(ValidationError::InvariantViolation { error_count: 1, .. })
    ));
}

#[test]
fn test_validate_and_parse_roundtrip() {
    setup();
    let snapshot = sample_snapshot();
    let json = serde_json::to_string_pretty(&snapshot).expect("serialize");
    let parsed = validate_and_parse_snapshot(&json).expect("valid snapshot");
    assert_eq!(parsed, snapshot);
}

#[test]
fn test_validate_and_parse_rejects_malformed_json() {
    let result = validate_and_parse_snapshot("{ not json");
    assert!(matches!(result, Err(ValidationError::JsonParsing { .. })));
}

#[test]
fn test_schema_definition_is_available() {
    let definition = get_schema_definition().expect("embedded schema parses");
    assert_eq!(definition["title"], "SchemaLens Snapshot Format v1.0");
}
