//! Progressive schema knowledge for an externally observed relational database.
//!
//! This crate learns a model of a database that can only be observed
//! partially and unreliably: a one-shot schema extraction, free-text SQL,
//! and sampled result rows. Observations are merged additively into a
//! persisted snapshot, changes are reported as structural diffs, and the
//! snapshot can be compressed to fit a prompt token budget.
//!
//! # Architecture
//! - `references` and `inference` turn SQL text and sampled values into signal
//! - `merge` and `diff` are pure functions over [`SchemaSnapshot`]s
//! - `builder` serializes all mutations per database through one worker task
//! - `adapters` holds the extraction and persistence collaborator traits
//! - `compression` produces the bounded projection handed to prompt construction

pub mod adapters;
pub mod builder;
pub mod compression;
pub mod config;
pub mod diff;
pub mod error;
pub mod inference;
pub mod logging;
pub mod merge;
pub mod models;
pub mod observation;
pub mod references;
pub mod validation;

// Re-export commonly used types
pub use adapters::{
    ExtractionOptions, JsonFileSnapshotStore, MemorySnapshotStore, SchemaExtractor,
    SnapshotStore, StaticSchemaExtractor,
};
pub use builder::{
    BuilderRegistry, BuilderState, LearnRequest, ResultSet, SchemaBuilder, SchemaChange,
};
pub use compression::{CompressedSchema, CompressionOptions, compress, compress_with_report};
pub use config::{BuilderConfig, InferenceConfig};
pub use diff::{SchemaDiff, diff};
pub use error::{EntityKind, Result, SchemaError};
pub use inference::infer_column;
pub use logging::init_logging;
pub use merge::{MergeOutcome, merge, merge_at};
pub use models::{Cardinality, Column, DataType, Relationship, SchemaSnapshot, Table};
pub use observation::{EntityRef, Observation, ObservedColumn, ObservedRelationship, ObservedTable, RawSchema};
pub use references::{TableReferences, extract_references};

pub use validation::{
    ValidationError, initialize_snapshot_validator, validate_and_parse_snapshot, validate_snapshot,
    validate_snapshot_document,
};
