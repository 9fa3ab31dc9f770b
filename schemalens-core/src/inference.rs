//! Column type inference from sampled result values.
//!
//! Samples are raw JSON values as they came back from a result grid. The
//! inferencer classifies them into one coarse [`DataType`] using a strict
//! precedence (integer, number, boolean, date, string) and reports
//! nullability. An empty or all-null sample yields `Unknown`, which the merger
//! never lets overwrite an established type.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::InferenceConfig;
use crate::models::DataType;

/// Date layouts accepted besides RFC 3339.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Datetime layouts accepted besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Result of inferring one column from its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredColumn {
    /// Coarse type; `Unknown` when no non-null sample was seen
    pub data_type: DataType,
    /// True iff at least one sample was null
    pub is_nullable: bool,
    /// Distinct non-null sample values, in order of appearance
    pub examples: Vec<Value>,
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
        }
        _ => false,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false")
        }
        _ => false,
    }
}

/// Returns true if the string parses as a date or timestamp.
pub fn parses_as_date(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    DateTime::parse_from_rfc3339(trimmed).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(trimmed, f).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|f| NaiveDate::parse_from_str(trimmed, f).is_ok())
}

fn is_date(value: &Value) -> bool {
    matches!(value, Value::String(s) if parses_as_date(s))
}

/// Classifies non-null samples by strict precedence.
fn classify(values: &[&Value]) -> DataType {
    if values.is_empty() {
        DataType::Unknown
    } else if values.iter().all(|v| is_integer(v)) {
        DataType::Integer
    } else if values.iter().all(|v| is_number(v)) {
        DataType::Number
    } else if values.iter().all(|v| is_boolean(v)) {
        DataType::Boolean
    } else if values.iter().all(|v| is_date(v)) {
        DataType::Date
    } else {
        DataType::String
    }
}

/// Infers the type and nullability of one column from sampled values.
///
/// Only the first `config.max_samples` values are considered.
///
/// # Example
/// ```rust
/// use schemalens_core::config::InferenceConfig;
/// use schemalens_core::inference::infer_column;
/// use schemalens_core::models::DataType;
/// use serde_json::json;
///
/// let inferred = infer_column(&[json!(1), json!(2), json!(null), json!(4)], &InferenceConfig::default());
/// assert_eq!(inferred.data_type, DataType::Integer);
/// assert!(inferred.is_nullable);
/// ```
pub fn infer_column(samples: &[Value], config: &InferenceConfig) -> InferredColumn {
    let window = samples.iter().take(config.max_samples);
    let mut is_nullable = false;
    let mut present: Vec<&Value> = Vec::new();
    for value in window {
        if value.is_null() {
            is_nullable = true;
        } else {
            present.push(value);
        }
    }

    let data_type = classify(&present);

    let mut examples: Vec<Value> = Vec::new();
    for value in &present {
        if examples.len() >= config.max_examples {
            break;
        }
        if !examples.contains(value) {
            examples.push((*value).clone());
        }
    }

    tracing::trace!(
        data_type = %data_type,
        nullable = is_nullable,
        samples = present.len(),
        "Inferred column type"
    );

    InferredColumn {
        data_type,
        is_nullable,
        examples,
    }
}
