//! Per-database schema orchestration.
//!
//! A [`SchemaBuilder`] owns the learned snapshot of one database id. All
//! mutations (learning from queries, extraction) are serialized through a
//! single worker task:
//! - **Learning**: `learn_from_query` enqueues and returns immediately
//! - **Extraction**: `extract_schema` goes through the same queue and waits
//!   for its own result
//! - **Reads**: `snapshot` returns the last committed snapshot without waiting
//!
//! Committed changes are published to subscribers as [`SchemaChange`]s.
//!
//! # Example
//! ```rust
//! use schemalens_core::adapters::{MemorySnapshotStore, StaticSchemaExtractor};
//! use schemalens_core::builder::{LearnRequest, SchemaBuilder};
//! use schemalens_core::config::BuilderConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> schemalens_core::Result<()> {
//! let builder = SchemaBuilder::new(
//!     "db1",
//!     Arc::new(MemorySnapshotStore::new()),
//!     Arc::new(StaticSchemaExtractor::empty()),
//!     BuilderConfig::default(),
//! )?;
//! builder.initialize().await?;
//! builder.learn_from_query(LearnRequest::new("SELECT users.email FROM users"))?;
//! builder.flush().await?;
//! assert!(builder.snapshot()?.table("users").is_ok());
//! # Ok(())
//! # }
//! ```

mod learning;
mod registry;
mod worker;

pub use learning::{LearnRequest, ResultSet};
pub use registry::BuilderRegistry;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::adapters::{SchemaExtractor, SnapshotStore};
use crate::compression::{CompressedSchema, CompressionOptions, compress};
use crate::config::BuilderConfig;
use crate::diff::SchemaDiff;
use crate::error::{Result, SchemaError};
use crate::models::SchemaSnapshot;
use worker::{Command, Worker};

/// Lifecycle state of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderState {
    /// Not initialized, or the worker has stopped
    Uninitialized,
    /// Idle and accepting work
    Ready,
    /// An extraction is in flight
    Extracting,
    /// A learning task is in flight
    Learning,
}

impl std::fmt::Display for BuilderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderState::Uninitialized => write!(f, "uninitialized"),
            BuilderState::Ready => write!(f, "ready"),
            BuilderState::Extracting => write!(f, "extracting"),
            BuilderState::Learning => write!(f, "learning"),
        }
    }
}

/// Notification of a committed, non-empty change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaChange {
    pub database_id: String,
    pub diff: SchemaDiff,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SchemaSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Orchestrator for one database id.
pub struct SchemaBuilder {
    database_id: String,
    store: Arc<dyn SnapshotStore>,
    extractor: Arc<dyn SchemaExtractor>,
    config: BuilderConfig,
    state: Arc<watch::Sender<BuilderState>>,
    changes: broadcast::Sender<SchemaChange>,
    running: OnceCell<Running>,
}

impl std::fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("database_id", &self.database_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SchemaBuilder {
    /// Creates an uninitialized builder.
    ///
    /// # Errors
    /// Returns `SchemaError::Configuration` for an empty database id or an
    /// invalid config.
    pub fn new(
        database_id: impl Into<String>,
        store: Arc<dyn SnapshotStore>,
        extractor: Arc<dyn SchemaExtractor>,
        config: BuilderConfig,
    ) -> Result<Self> {
        let database_id = database_id.into();
        if database_id.trim().is_empty() {
            return Err(SchemaError::configuration("database id must not be empty"));
        }
        config.validate()?;

        let (state, _) = watch::channel(BuilderState::Uninitialized);
        let (changes, _) = broadcast::channel(config.notification_capacity);
        Ok(Self {
            database_id,
            store,
            extractor,
            config,
            state: Arc::new(state),
            changes,
            running: OnceCell::new(),
        })
    }

    /// Database id this builder is responsible for.
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Builder configuration.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BuilderState {
        *self.state.borrow()
    }

    /// Loads the persisted snapshot (or starts empty) and starts the worker.
    ///
    /// Calling this again after success is a no-op.
    ///
    /// # Errors
    /// Returns `SchemaError::Persistence` if the stored snapshot cannot be read.
    pub async fn initialize(&self) -> Result<()> {
        self.running
            .get_or_try_init(|| async {
                let snapshot = match self.store.get_snapshot(&self.database_id).await? {
                    Some(snapshot) => snapshot,
                    None => SchemaSnapshot::new(self.database_id.clone()),
                };
                let stats = snapshot.stats();

                let (commands, receiver) = mpsc::unbounded_channel();
                let (snapshot_tx, snapshots) = watch::channel(snapshot.clone());
                let worker = Worker {
                    database_id: self.database_id.clone(),
                    snapshot,
                    store: Arc::clone(&self.store),
                    extractor: Arc::clone(&self.extractor),
                    config: self.config.clone(),
                    state: Arc::clone(&self.state),
                    snapshots: snapshot_tx,
                    changes: self.changes.clone(),
                };

                let span = tracing::info_span!("schema_builder", database_id = %self.database_id);
                let task = tokio::spawn(worker.run(receiver).instrument(span));
                self.state.send_replace(BuilderState::Ready);

                tracing::info!(
                    database_id = %self.database_id,
                    tables = stats.tables,
                    columns = stats.columns,
                    "Schema builder initialized"
                );

                Ok::<_, SchemaError>(Running {
                    commands,
                    snapshots,
                    task: Mutex::new(Some(task)),
                })
            })
            .await?;
        Ok(())
    }

    fn running(&self) -> Result<&Running> {
        self.running.get().ok_or_else(|| SchemaError::NotInitialized {
            database_id: self.database_id.clone(),
        })
    }

    fn unavailable(&self) -> SchemaError {
        SchemaError::BuilderUnavailable {
            database_id: self.database_id.clone(),
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.running()?
            .commands
            .send(command)
            .map_err(|_| self.unavailable())
    }

    /// Enqueues a learning task and returns without waiting for it.
    ///
    /// Failures inside the task are logged, never returned.
    ///
    /// # Errors
    /// Returns `NotInitialized` before `initialize()` and
    /// `BuilderUnavailable` after `shutdown()`.
    pub fn learn_from_query(&self, request: LearnRequest) -> Result<()> {
        self.send(Command::Learn(request))
    }

    /// Returns the snapshot, re-extracting when it is stale, empty, or `force` is set.
    ///
    /// Runs after every task enqueued before it.
    ///
    /// # Errors
    /// Propagates extraction and persistence failures; the committed snapshot
    /// is left unchanged.
    pub async fn extract_schema(&self, force: bool) -> Result<SchemaSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Extract { force, reply })?;
        response.await.map_err(|_| self.unavailable())?
    }

    /// Last committed snapshot.
    ///
    /// # Errors
    /// Returns `NotInitialized` before `initialize()`.
    pub fn snapshot(&self) -> Result<SchemaSnapshot> {
        Ok(self.running()?.snapshots.borrow().clone())
    }

    /// Waits until every previously enqueued task has finished.
    ///
    /// # Errors
    /// Returns `NotInitialized` or `BuilderUnavailable`.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Flush { reply })?;
        done.await.map_err(|_| self.unavailable())
    }

    /// Subscribes to committed schema changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SchemaChange> {
        self.changes.subscribe()
    }

    /// Compresses the last committed snapshot.
    ///
    /// # Errors
    /// Returns `Configuration` for invalid options and `NotInitialized`
    /// before `initialize()`.
    pub fn compress<S: AsRef<str>>(
        &self,
        referenced_tables: &[S],
        options: &CompressionOptions,
    ) -> Result<CompressedSchema> {
        options.validate()?;
        let snapshot = self.snapshot()?;
        Ok(compress(&snapshot, referenced_tables, options))
    }

    /// Stops accepting work, drains queued tasks and waits for the worker.
    ///
    /// A builder that was never initialized shuts down trivially.
    ///
    /// # Errors
    /// Currently infallible; reserved for store flushes.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(running) = self.running.get() else {
            return Ok(());
        };

        let (reply, done) = oneshot::channel();
        if running.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }

        if let Some(task) = running.task.lock().await.take()
            && let Err(e) = task.await
        {
            tracing::warn!(database_id = %self.database_id, error = %e, "Schema builder worker ended abnormally");
        }
        tracing::debug!(database_id = %self.database_id, "Schema builder shut down");
        Ok(())
    }
}
