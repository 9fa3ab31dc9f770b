//! Validation of persisted snapshot documents.
//!
//! Two layers:
//! - an embedded JSON Schema checks the document shape and format version
//! - [`validate_snapshot`] checks the structural invariants serde cannot see:
//!   unique table ids, unique column ids per table, and relationships that
//!   resolve to existing tables and columns
//!
//! # Example
//! ```rust
//! use schemalens_core::models::SchemaSnapshot;
//! use schemalens_core::validation::{validate_snapshot, validate_snapshot_document};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = SchemaSnapshot::new("db1");
//! validate_snapshot(&snapshot)?;
//! validate_snapshot_document(&serde_json::to_value(&snapshot)?)?;
//! # Ok(())
//! # }
//! ```

use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::SchemaSnapshot;

/// Snapshot validation errors with field-level reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// The document does not match the snapshot schema
    #[error("Snapshot validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// Unsupported format version detected
    #[error("Unsupported format version '{version}'. Supported versions: {supported:?}")]
    UnsupportedVersion {
        version: String,
        supported: Vec<String>,
    },

    /// The snapshot breaks an id or reference invariant
    #[error("Snapshot invariants violated with {error_count} errors: {errors:?}")]
    InvariantViolation {
        error_count: usize,
        errors: Vec<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Supported format versions
const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Embedded JSON Schema for the v1.0 snapshot format
const SNAPSHOT_SCHEMA_V1_0: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "SchemaLens Snapshot Format v1.0",
  "type": "object",
  "required": ["format_version", "database_id", "last_updated"],
  "properties": {
    "format_version": { "type": "string", "pattern": "^1\\.0$" },
    "database_id": { "type": "string", "minLength": 1 },
    "database_name": { "type": "string" },
    "last_updated": { "type": "string", "format": "date-time" },
    "tables": {
      "type": "array",
      "default": [],
      "items": {
        "type": "object",
        "required": ["id", "name"],
        "properties": {
          "id": { "type": "string", "minLength": 1 },
          "name": { "type": "string", "minLength": 1 },
          "description": { "type": "string" },
          "columns": {
            "type": "array",
            "default": [],
            "items": {
              "type": "object",
              "required": ["id", "name", "data_type"],
              "properties": {
                "id": { "type": "string", "minLength": 1 },
                "name": { "type": "string", "minLength": 1 },
                "data_type": {
                  "enum": ["unknown", "integer", "number", "boolean", "date", "string"]
                },
                "description": { "type": "string" },
                "is_primary_key": { "type": "boolean" },
                "is_foreign_key": { "type": "boolean" },
                "is_nullable": { "type": "boolean" },
                "examples": { "type": "array", "maxItems": 10 }
              }
            }
          }
        }
      }
    },
    "relationships": {
      "type": "array",
      "default": [],
      "items": {
        "type": "object",
        "required": [
          "id",
          "source_table_id",
          "source_column_id",
          "target_table_id",
          "target_column_id"
        ],
        "properties": {
          "id": { "type": "string", "minLength": 1 },
          "source_table_id": { "type": "string" },
          "source_column_id": { "type": "string" },
          "target_table_id": { "type": "string" },
          "target_column_id": { "type": "string" },
          "cardinality": { "enum": ["one-to-one", "one-to-many", "many-to-many"] }
        }
      }
    }
  }
}"#;

/// Compiled JSON Schema instance (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Initialize and compile the snapshot JSON Schema.
///
/// Safe to call more than once; later calls keep the first compiled schema.
///
/// # Errors
/// Returns `ValidationError::SchemaCompilation` if the embedded schema is invalid.
pub fn initialize_snapshot_validator() -> Result<(), ValidationError> {
    if COMPILED_SCHEMA.get().is_some() {
        return Ok(());
    }

    let compiled = jsonschema::validator_for(&get_schema_definition()?).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    let _ = COMPILED_SCHEMA.set(compiled);
    Ok(())
}

fn compiled_schema() -> Result<&'static Validator, ValidationError> {
    initialize_snapshot_validator()?;
    COMPILED_SCHEMA
        .get()
        .ok_or_else(|| ValidationError::SchemaCompilation {
            message: "Snapshot validator could not be initialized".to_string(),
        })
}

/// Validates a snapshot document against the embedded JSON Schema.
///
/// # Errors
/// Returns `UnsupportedVersion` for an unknown `format_version` and
/// `ValidationFailed` listing every schema violation.
pub fn validate_snapshot_document(json_value: &Value) -> Result<(), ValidationError> {
    let schema = compiled_schema()?;

    validate_format_version(json_value)?;

    let errors: Vec<String> = schema
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    Ok(())
}

fn validate_format_version(json_value: &Value) -> Result<(), ValidationError> {
    let version = json_value
        .get("format_version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::ValidationFailed {
            error_count: 1,
            errors: vec!["Missing required field 'format_version'".to_string()],
        })?;

    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ValidationError::UnsupportedVersion {
            version: version.to_string(),
            supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(())
}

/// Checks the id and reference invariants of a snapshot.
///
/// # Errors
/// Returns `InvariantViolation` listing duplicate ids and dangling relationships.
pub fn validate_snapshot(snapshot: &SchemaSnapshot) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    let mut table_ids = HashSet::new();
    for table in &snapshot.tables {
        if !table_ids.insert(table.id.as_str()) {
            errors.push(format!("Duplicate table id '{}'", table.id));
        }

        let mut column_ids = HashSet::new();
        for column in &table.columns {
            if !column_ids.insert(column.id.as_str()) {
                errors.push(format!(
                    "Duplicate column id '{}' in table '{}'",
                    column.id, table.name
                ));
            }
        }
    }

    for relationship in &snapshot.relationships {
        if !snapshot.relationship_resolves(relationship) {
            errors.push(format!(
                "Relationship '{}' references a missing table or column",
                relationship.id
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvariantViolation {
            error_count: errors.len(),
            errors,
        })
    }
}

/// Parses, validates and deserializes a snapshot document.
///
/// # Errors
/// Returns validation errors for malformed JSON, schema violations, or broken
/// invariants.
pub fn validate_and_parse_snapshot(json_str: &str) -> Result<SchemaSnapshot, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;

    validate_snapshot_document(&json_value)?;

    let snapshot: SchemaSnapshot = serde_json::from_value(json_value)?;
    validate_snapshot(&snapshot)?;

    Ok(snapshot)
}

/// Returns the embedded JSON Schema as a parsed value.
pub fn get_schema_definition() -> Result<Value, ValidationError> {
    serde_json::from_str(SNAPSHOT_SCHEMA_V1_0).map_err(|e| ValidationError::SchemaCompilation {
        message: format!("Failed to parse embedded schema: {}", e),
    })
}

#[cfg(test)]
mod tests;
