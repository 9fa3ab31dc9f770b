//! Schema compression for prompt construction.
//!
//! Produces a size-bounded projection of a snapshot plus its flat text form:
//! - **Prioritization**: tables the current query references sort first
//! - **Truncation**: table and per-table column limits, key columns first
//! - **Budgeting**: detail is shed until the text fits an approximate token budget
//!
//! # Example
//! ```rust
//! use schemalens_core::compression::{compress_with_report, CompressionOptions};
//! use schemalens_core::models::SchemaSnapshot;
//!
//! let snapshot = SchemaSnapshot::new("db1");
//! let options = CompressionOptions::default().with_max_tokens(500);
//! let (compressed, report) = compress_with_report(&snapshot, &["orders"], &options);
//! assert!(compressed.is_empty());
//! assert!(report.within_budget());
//! ```

mod compressor;
mod config;
mod models;

// Re-export public API
pub use compressor::{compress, compress_with_report};
pub use config::CompressionOptions;
pub use models::{
    CompressedColumn, CompressedRelationship, CompressedSchema, CompressedTable,
    CompressionReport, estimate_tokens,
};
