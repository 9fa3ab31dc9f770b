//! Error types for the schema-knowledge engine.
//!
//! Only failures a caller can act on are surfaced here: extraction and
//! persistence failures from the collaborators, lookups of entities that do
//! not exist, and configuration mistakes. Heuristic failures (unparseable SQL,
//! odd sample values) are never errors; they are logged and the engine keeps
//! whatever partial signal it found.

use thiserror::Error;

use crate::validation::ValidationError;

/// Kinds of entities that can be looked up and reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A table inside a snapshot
    Table,
    /// A column inside a table
    Column,
    /// A persisted snapshot for a database id
    Snapshot,
    /// A builder registered for a database id
    Builder,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Table => write!(f, "table"),
            EntityKind::Column => write!(f, "column"),
            EntityKind::Snapshot => write!(f, "snapshot"),
            EntityKind::Builder => write!(f, "builder"),
        }
    }
}

/// Main error type for schemalens operations.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The extraction collaborator could not observe the schema
    #[error("Schema extraction failed: {context}")]
    Extraction {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The persistence collaborator failed to read or write a snapshot
    #[error("Snapshot persistence failed: {context}")]
    Persistence {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A requested entity does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    /// Configuration or option validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An extraction reported a different database than the builder owns
    #[error("Extraction for database '{found}' cannot be merged into '{expected}'")]
    DatabaseMismatch { expected: String, found: String },

    /// The builder was used before `initialize()` completed
    #[error("Schema builder for '{database_id}' is not initialized")]
    NotInitialized { database_id: String },

    /// The builder's worker has stopped accepting tasks
    #[error("Schema builder for '{database_id}' is no longer running")]
    BuilderUnavailable { database_id: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted snapshot document failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Convenience type alias for Results with SchemaError
pub type Result<T> = std::result::Result<T, SchemaError>;

impl SchemaError {
    /// Creates an extraction error with context
    pub fn extraction_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Extraction {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a persistence error with context
    pub fn persistence_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Persistence {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a not-found error
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Extraction and persistence failures depend on collaborators outside
    /// the engine; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::Persistence { .. } | Self::Io { .. }
        )
    }
}
