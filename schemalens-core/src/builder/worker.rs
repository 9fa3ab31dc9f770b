//! Single-consumer worker owning one database's snapshot.
//!
//! Every mutation goes through one FIFO channel and is processed to
//! completion, persistence included, before the next command is taken.
//! A failed learning task is logged and leaves the committed snapshot as it was.
//! Commands accepted before shutdown are always processed.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::learning::{LearnRequest, observation_from_query};
use super::{BuilderState, SchemaChange};
use crate::adapters::{ExtractionOptions, SchemaExtractor, SnapshotStore};
use crate::config::BuilderConfig;
use crate::diff::diff;
use crate::error::{Result, SchemaError};
use crate::merge::merge_at;
use crate::models::SchemaSnapshot;
use crate::observation::Observation;

/// Commands accepted by the worker, processed strictly in order.
pub(super) enum Command {
    Learn(LearnRequest),
    Extract {
        force: bool,
        reply: oneshot::Sender<Result<SchemaSnapshot>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(super) struct Worker {
    pub(super) database_id: String,
    pub(super) snapshot: SchemaSnapshot,
    pub(super) store: Arc<dyn SnapshotStore>,
    pub(super) extractor: Arc<dyn SchemaExtractor>,
    pub(super) config: BuilderConfig,
    pub(super) state: Arc<watch::Sender<BuilderState>>,
    pub(super) snapshots: watch::Sender<SchemaSnapshot>,
    pub(super) changes: broadcast::Sender<SchemaChange>,
}

impl Worker {
    /// Processes commands until the queue is closed and empty.
    ///
    /// `Shutdown` closes the queue but every command accepted before the close
    /// still runs; shutdown callers are answered once the queue is drained.
    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Schema builder worker started");
        let mut stopping: Vec<oneshot::Sender<()>> = Vec::new();
        while let Some(command) = commands.recv().await {
            match command {
                Command::Learn(request) => self.learn(request).await,
                Command::Extract { force, reply } => {
                    let result = self.extract(force).await;
                    // Caller may have stopped waiting.
                    let _ = reply.send(result);
                }
                Command::Flush { reply } => {
                    let _ = reply.send(());
                }
                Command::Shutdown { reply } => {
                    if stopping.is_empty() {
                        commands.close();
                        tracing::debug!("Shutdown requested; draining queued commands");
                    }
                    stopping.push(reply);
                }
            }
        }
        self.state.send_replace(BuilderState::Uninitialized);
        for reply in stopping {
            let _ = reply.send(());
        }
        tracing::debug!("Schema builder worker stopped");
    }

    fn set_state(&self, state: BuilderState) {
        self.state.send_replace(state);
    }

    async fn learn(&mut self, request: LearnRequest) {
        self.set_state(BuilderState::Learning);
        let observation = observation_from_query(&request, &self.config.inference);
        if observation.is_empty() {
            tracing::debug!("Query carried no schema signal");
        } else if let Err(e) = self.commit(&observation).await {
            tracing::error!(error = %e, "Learning task failed");
        }
        self.set_state(BuilderState::Ready);
    }

    async fn extract(&mut self, force: bool) -> Result<SchemaSnapshot> {
        let age = self.snapshot.age(Utc::now());
        if !force && !self.snapshot.is_empty() && age < self.config.max_age {
            tracing::debug!(age_secs = age.as_secs(), "Snapshot is fresh; skipping extraction");
            return Ok(self.snapshot.clone());
        }

        self.set_state(BuilderState::Extracting);
        let result = self.refresh().await;
        self.set_state(BuilderState::Ready);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Schema extraction failed; keeping last known snapshot");
        }
        result
    }

    async fn refresh(&mut self) -> Result<SchemaSnapshot> {
        let options = ExtractionOptions::new(self.database_id.clone());
        let Some(mut raw) = self.extractor.extract_raw_schema(&options).await? else {
            tracing::warn!("Extractor observed nothing");
            return Ok(self.snapshot.clone());
        };
        if !raw.database_id.is_empty() && raw.database_id != self.database_id {
            tracing::warn!(
                extracted = %raw.database_id,
                "Extraction belongs to another database; refusing to merge"
            );
            return Err(SchemaError::DatabaseMismatch {
                expected: self.database_id.clone(),
                found: raw.database_id,
            });
        }
        if raw.tables.is_empty() {
            tracing::warn!("Extractor returned no tables");
            return Ok(self.snapshot.clone());
        }

        if options.include_relationships {
            match self.extractor.extract_relationships(&options).await {
                Ok(relationships) => raw.relationships.extend(relationships),
                Err(e) => {
                    tracing::warn!(error = %e, "Relationship extraction failed; continuing without");
                }
            }
        }

        self.commit(&Observation::Extracted(raw)).await?;
        let stats = self.snapshot.stats();
        tracing::info!(
            tables = stats.tables,
            columns = stats.columns,
            relationships = stats.relationships,
            "Schema extracted"
        );
        Ok(self.snapshot.clone())
    }

    /// Merges, persists, then publishes. Memory is only updated after the save succeeds.
    async fn commit(&mut self, observation: &Observation) -> Result<bool> {
        let outcome = merge_at(self.snapshot.clone(), observation, Utc::now());
        if !outcome.changed {
            return Ok(false);
        }

        let saved = self.store.save_snapshot(&outcome.snapshot).await?;
        let changes = diff(&self.snapshot, &saved);
        self.snapshot = saved;
        self.snapshots.send_replace(self.snapshot.clone());

        if !changes.is_empty() {
            let summary = changes.summary();
            tracing::debug!(?summary, "Committed schema change");
            // No subscribers is fine.
            let _ = self.changes.send(SchemaChange {
                database_id: self.database_id.clone(),
                diff: changes,
            });
        }
        Ok(true)
    }
}
