//! Integration tests for the schema builder worker, its collaborators and
//! the file-backed store.

use async_trait::async_trait;
use schemalens_core::adapters::{
    ExtractionOptions, JsonFileSnapshotStore, MemorySnapshotStore, SchemaExtractor, SnapshotStore,
};
use schemalens_core::builder::{BuilderState, LearnRequest, ResultSet, SchemaBuilder};
use schemalens_core::config::BuilderConfig;
use schemalens_core::error::{Result, SchemaError};
use schemalens_core::models::{DataType, SchemaSnapshot};
use schemalens_core::observation::{ObservedColumn, ObservedRelationship, ObservedTable, RawSchema};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Test collaborators
// ============================================================================

fn io_error(message: &str) -> std::io::Error {
    std::io::Error::other(message.to_string())
}

/// Memory store that refuses snapshots containing a table named `poison`.
#[derive(Default)]
struct RecordingStore {
    inner: MemorySnapshotStore,
    saves: AtomicUsize,
}

impl RecordingStore {
    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    async fn get_snapshot(&self, database_id: &str) -> Result<Option<SchemaSnapshot>> {
        self.inner.get_snapshot(database_id).await
    }

    async fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> Result<SchemaSnapshot> {
        if snapshot.table_by_name("poison").is_some() {
            return Err(SchemaError::persistence_failed("save snapshot", io_error("disk rejected poison")));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_snapshot(snapshot).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }
}

#[derive(Default)]
struct ScriptedExtractor {
    raw: Option<RawSchema>,
    relationships: Vec<ObservedRelationship>,
    fail: AtomicBool,
    fail_relationships: bool,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn returning(raw: RawSchema) -> Self {
        Self {
            raw: Some(raw),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaExtractor for ScriptedExtractor {
    async fn extract_raw_schema(&self, _options: &ExtractionOptions) -> Result<Option<RawSchema>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SchemaError::extraction_failed("scrape schema browser", io_error("unreachable")));
        }
        Ok(self.raw.clone())
    }

    async fn extract_relationships(
        &self,
        _options: &ExtractionOptions,
    ) -> Result<Vec<ObservedRelationship>> {
        if self.fail_relationships {
            return Err(SchemaError::extraction_failed("scrape relationships", io_error("unavailable")));
        }
        Ok(self.relationships.clone())
    }
}

fn shop_schema() -> RawSchema {
    RawSchema {
        database_id: "db1".to_string(),
        database_name: Some("Shop".to_string()),
        tables: vec![
            ObservedTable::named("users")
                .with_column(ObservedColumn::named("id").with_type(DataType::Integer))
                .with_column(ObservedColumn::named("email").with_type(DataType::String)),
            ObservedTable::named("orders")
                .with_column(ObservedColumn::named("id").with_type(DataType::Integer))
                .with_column(ObservedColumn::named("user_id").with_type(DataType::Integer)),
        ],
        relationships: Vec::new(),
    }
}

async fn start(
    store: Arc<dyn SnapshotStore>,
    extractor: Arc<dyn SchemaExtractor>,
    config: BuilderConfig,
) -> SchemaBuilder {
    let builder = SchemaBuilder::new("db1", store, extractor, config).unwrap();
    builder.initialize().await.unwrap();
    builder
}

// ============================================================================
// Learning
// ============================================================================

#[tokio::test]
async fn test_integration_learning_infers_types_in_order() {
    let store = Arc::new(RecordingStore::default());
    let builder = start(store.clone(), Arc::new(ScriptedExtractor::default()), BuilderConfig::default()).await;

    builder
        .learn_from_query(LearnRequest::new("SELECT u.id FROM users u"))
        .unwrap();
    builder
        .learn_from_query(
            LearnRequest::new("SELECT id, email FROM users").with_result(ResultSet::new(
                vec!["id".to_string(), "email".to_string()],
                vec![json!([1, "a@example.com"]), json!([2, null])],
            )),
        )
        .unwrap();
    builder.flush().await.unwrap();

    let snapshot = builder.snapshot().unwrap();
    let users = snapshot.table("users").unwrap();
    let id = users.column("id").unwrap();
    let email = users.column("email").unwrap();
    assert_eq!(id.data_type, DataType::Integer);
    assert_eq!(email.data_type, DataType::String);
    assert!(email.is_nullable);
    assert_eq!(email.examples, vec![json!("a@example.com")]);
    assert_eq!(store.saves(), 2);
    assert_eq!(builder.state(), BuilderState::Ready);

    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_failed_learning_task_is_isolated() {
    let store = Arc::new(RecordingStore::default());
    let builder = start(store.clone(), Arc::new(ScriptedExtractor::default()), BuilderConfig::default()).await;

    builder
        .learn_from_query(LearnRequest::new("SELECT * FROM poison"))
        .unwrap();
    builder
        .learn_from_query(LearnRequest::new("SELECT users.email FROM users"))
        .unwrap();
    builder.flush().await.unwrap();

    let snapshot = builder.snapshot().unwrap();
    assert!(snapshot.table_by_name("poison").is_none());
    assert!(snapshot.table("users").is_ok());
    assert_eq!(store.saves(), 1);

    let persisted = store.require_snapshot("db1").await.unwrap();
    assert!(persisted.table_by_name("poison").is_none());
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_repeated_query_does_not_persist_again() {
    let store = Arc::new(RecordingStore::default());
    let builder = start(store.clone(), Arc::new(ScriptedExtractor::default()), BuilderConfig::default()).await;

    for _ in 0..3 {
        builder
            .learn_from_query(LearnRequest::new("SELECT users.email FROM users"))
            .unwrap();
    }
    builder.flush().await.unwrap();

    assert_eq!(store.saves(), 1);
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_subscribers_receive_committed_changes() {
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(ScriptedExtractor::default()),
        BuilderConfig::default(),
    )
    .await;
    let mut changes = builder.subscribe();

    builder
        .learn_from_query(LearnRequest::new("SELECT users.email FROM users"))
        .unwrap();
    builder.flush().await.unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.database_id, "db1");
    let summary = change.diff.summary();
    assert_eq!(summary.tables_added, 1);
    assert_eq!(summary.columns_added, 1);

    // Nothing new, nothing published.
    builder
        .learn_from_query(LearnRequest::new("SELECT users.email FROM users"))
        .unwrap();
    builder.flush().await.unwrap();
    assert!(changes.try_recv().is_err());

    builder.shutdown().await.unwrap();
}

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_integration_fresh_snapshot_skips_extraction() {
    let extractor = Arc::new(ScriptedExtractor::returning(shop_schema()));
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        extractor.clone(),
        BuilderConfig::default(),
    )
    .await;

    let first = builder.extract_schema(false).await.unwrap();
    assert_eq!(first.tables.len(), 2);
    assert_eq!(first.database_name.as_deref(), Some("Shop"));
    assert_eq!(extractor.calls(), 1);

    let second = builder.extract_schema(false).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(extractor.calls(), 1);

    let forced = builder.extract_schema(true).await.unwrap();
    assert_eq!(forced.tables, first.tables);
    assert_eq!(extractor.calls(), 2);

    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_zero_max_age_always_extracts() {
    let extractor = Arc::new(ScriptedExtractor::returning(shop_schema()));
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        extractor.clone(),
        BuilderConfig::default().with_max_age(Duration::ZERO),
    )
    .await;

    builder.extract_schema(false).await.unwrap();
    builder.extract_schema(false).await.unwrap();
    assert_eq!(extractor.calls(), 2);
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_extraction_failure_keeps_snapshot() {
    let extractor = Arc::new(ScriptedExtractor::returning(shop_schema()));
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        extractor.clone(),
        BuilderConfig::default(),
    )
    .await;
    let before = builder.extract_schema(false).await.unwrap();

    extractor.fail.store(true, Ordering::SeqCst);
    let err = builder.extract_schema(true).await.unwrap_err();
    assert!(matches!(err, SchemaError::Extraction { .. }));
    assert!(err.is_retryable());

    assert_eq!(builder.snapshot().unwrap(), before);
    assert_eq!(builder.state(), BuilderState::Ready);
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_extraction_for_other_database_is_refused() {
    let store = Arc::new(RecordingStore::default());
    let extractor = ScriptedExtractor::returning(RawSchema {
        database_id: "crm".to_string(),
        ..shop_schema()
    });
    let builder = start(store.clone(), Arc::new(extractor), BuilderConfig::default()).await;

    let err = builder.extract_schema(true).await.unwrap_err();
    assert!(matches!(err, SchemaError::DatabaseMismatch { ref found, .. } if found == "crm"));
    assert!(builder.snapshot().unwrap().is_empty());
    assert_eq!(store.saves(), 0);
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_empty_extraction_returns_current_snapshot() {
    let store = Arc::new(RecordingStore::default());
    let builder = start(store.clone(), Arc::new(ScriptedExtractor::default()), BuilderConfig::default()).await;

    let snapshot = builder.extract_schema(false).await.unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(store.saves(), 0);

    let extractor = ScriptedExtractor::returning(RawSchema {
        database_id: "db1".to_string(),
        ..RawSchema::default()
    });
    let empty_tables = start(
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(extractor),
        BuilderConfig::default(),
    )
    .await;
    assert!(empty_tables.extract_schema(true).await.unwrap().is_empty());

    builder.shutdown().await.unwrap();
    empty_tables.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_relationships_are_merged_and_failures_tolerated() {
    let extractor = ScriptedExtractor {
        relationships: vec![ObservedRelationship::by_name("orders", "user_id", "users", "id")],
        ..ScriptedExtractor::returning(shop_schema())
    };
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(extractor),
        BuilderConfig::default(),
    )
    .await;
    let snapshot = builder.extract_schema(false).await.unwrap();
    assert_eq!(snapshot.relationships.len(), 1);
    assert!(snapshot.relationship_resolves(&snapshot.relationships[0]));
    builder.shutdown().await.unwrap();

    let failing = ScriptedExtractor {
        fail_relationships: true,
        ..ScriptedExtractor::returning(shop_schema())
    };
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(failing),
        BuilderConfig::default(),
    )
    .await;
    let snapshot = builder.extract_schema(false).await.unwrap();
    assert_eq!(snapshot.tables.len(), 2);
    assert!(snapshot.relationships.is_empty());
    builder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_extraction_waits_for_queued_learning() {
    let builder = start(
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(ScriptedExtractor::default()),
        BuilderConfig::default(),
    )
    .await;

    builder
        .learn_from_query(LearnRequest::new("SELECT invoices.total FROM invoices"))
        .unwrap();
    let snapshot = builder.extract_schema(true).await.unwrap();
    assert!(snapshot.table("invoices").is_ok());
    builder.shutdown().await.unwrap();
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_integration_shutdown_processes_every_accepted_task() {
    let store = Arc::new(MemorySnapshotStore::new());
    let builder = Arc::new(
        start(store.clone(), Arc::new(ScriptedExtractor::default()), BuilderConfig::default()).await,
    );

    let producer = {
        let builder = Arc::clone(&builder);
        tokio::spawn(async move {
            let mut accepted = Vec::new();
            for i in 0..200 {
                let table = format!("table_{}", i);
                let request = LearnRequest::new(format!("SELECT {0}.id FROM {0}", table));
                if builder.learn_from_query(request).is_ok() {
                    accepted.push(table);
                }
                tokio::task::yield_now().await;
            }
            accepted
        })
    };
    tokio::task::yield_now().await;
    builder.shutdown().await.unwrap();
    let accepted = producer.await.unwrap();

    let snapshot = store
        .get_snapshot("db1")
        .await
        .unwrap()
        .unwrap_or_else(|| SchemaSnapshot::new("db1"));
    for table in &accepted {
        assert!(snapshot.table_by_name(table).is_some(), "accepted task for {} was lost", table);
    }
    assert_eq!(builder.state(), BuilderState::Uninitialized);
    assert!(matches!(
        builder.learn_from_query(LearnRequest::new("SELECT a.b FROM a")),
        Err(SchemaError::BuilderUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_integration_new_builder_reloads_persisted_snapshot() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
    let extractor: Arc<dyn SchemaExtractor> = Arc::new(ScriptedExtractor::default());

    let first = start(Arc::clone(&store), Arc::clone(&extractor), BuilderConfig::default()).await;
    first
        .learn_from_query(LearnRequest::new("SELECT users.email FROM users"))
        .unwrap();
    first.flush().await.unwrap();
    first.shutdown().await.unwrap();

    let second = start(store, extractor, BuilderConfig::default()).await;
    let snapshot = second.snapshot().unwrap();
    assert!(snapshot.table("users").unwrap().column("email").is_ok());
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_integration_json_store_end_to_end() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileSnapshotStore::open(dir.path()).await.unwrap());
    let extractor = Arc::new(ScriptedExtractor::returning(shop_schema()));

    let builder = start(store.clone(), extractor, BuilderConfig::default()).await;
    builder.extract_schema(false).await.unwrap();
    builder
        .learn_from_query(
            LearnRequest::new("SELECT o.total FROM orders o").with_result(ResultSet::new(
                vec!["total".to_string()],
                vec![json!(["12.50"]), json!(["3.25"])],
            )),
        )
        .unwrap();
    builder.flush().await.unwrap();
    builder.shutdown().await.unwrap();

    let reopened = JsonFileSnapshotStore::open(dir.path()).await.unwrap();
    let snapshot = reopened.require_snapshot("db1").await.unwrap();
    let orders = snapshot.table("orders").unwrap();
    assert_eq!(orders.column("total").unwrap().data_type, DataType::Number);
    assert_eq!(orders.columns.len(), 3);

    reopened.clear_all().await.unwrap();
    assert!(reopened.get_snapshot("db1").await.unwrap().is_none());
}
