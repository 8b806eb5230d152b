//! End-to-end test infrastructure for the reindex pipeline.
//!
//! Provides a shared TestHarness backed by a real RocksDB record store and
//! Tantivy index, plus helpers for seeding records and building indexers.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use reindex_pipeline::{
    DocumentMapper, JsonDocumentMapper, MassIndexer, ReindexConfig, StorageRecordSource,
    TantivyIndexSink,
};
use reindex_search::{SearchIndex, SearchIndexConfig, SearchIndexer};
use reindex_storage::RecordStore;
use reindex_types::{Record, RecordId, RecordType};

/// Upper bound on ids listed by the inspection helpers.
const MAX_LISTED: usize = 10_000;

/// Shared test harness for E2E tests.
///
/// Every harness owns its own temp directory, so tests can run in parallel.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: Arc<RecordStore>,
    pub index: SearchIndex,
    /// Single writer shared by every indexer built from this harness
    pub indexer: Arc<SearchIndexer>,
    pub db_path: PathBuf,
    pub index_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("db");
        let index_path = temp_dir.path().join("index");
        std::fs::create_dir_all(&index_path).expect("Failed to create index dir");

        let store = Arc::new(RecordStore::open(&db_path).expect("Failed to open test store"));
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(&index_path))
            .expect("Failed to open test index");
        let indexer = Arc::new(SearchIndexer::new(&index).expect("Failed to create indexer"));

        Self {
            _temp_dir: temp_dir,
            store,
            index,
            indexer,
            db_path,
            index_path,
        }
    }

    /// Store `records` in one batch.
    pub fn seed(&self, records: &[Record]) {
        self.store
            .put_records(records)
            .expect("Failed to seed records");
    }

    /// Mass indexer over this harness using the JSON mapper.
    pub fn mass_indexer(&self, config: ReindexConfig) -> MassIndexer {
        self.mass_indexer_with(config, Arc::new(JsonDocumentMapper::new()))
    }

    pub fn mass_indexer_with(
        &self,
        config: ReindexConfig,
        mapper: Arc<dyn DocumentMapper>,
    ) -> MassIndexer {
        MassIndexer::new(
            config,
            Arc::new(StorageRecordSource::new(self.store.clone())),
            mapper,
            Arc::new(TantivyIndexSink::new(self.indexer.clone())),
        )
    }

    /// Committed document count for a type.
    pub fn indexed(&self, record_type: &RecordType) -> u64 {
        self.index
            .count_documents(Some(record_type))
            .expect("Failed to count documents")
    }

    /// Sorted ids of committed documents of a type.
    pub fn indexed_ids(&self, record_type: &RecordType) -> Vec<RecordId> {
        self.index
            .document_ids(record_type, MAX_LISTED)
            .expect("Failed to list document ids")
    }

    /// Sorted ids of stored records of a type.
    pub fn stored_ids(&self, record_type: &RecordType) -> Vec<RecordId> {
        self.store
            .page_ids(record_type, None, MAX_LISTED, None)
            .expect("Failed to page ids")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Create N records with zero-padded sequential ids (`"{prefix}-00000"`, ...).
pub fn create_test_records(record_type: &str, count: usize, base_text: &str) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new(
                RecordType::new(record_type),
                format!("{}-{:05}", record_type, i),
                json!({
                    "title": format!("{} (item {})", base_text, i),
                    "position": i,
                    "draft": i % 10 == 9,
                }),
            )
        })
        .collect()
}

/// Create N records with ULID ids, which sort in creation order.
pub fn create_ulid_records(record_type: &str, count: usize, base_text: &str) -> Vec<Record> {
    let base_ts: u64 = 1_706_540_400_000;
    (0..count)
        .map(|i| {
            let id = ulid::Ulid::from_parts(base_ts + i as u64, rand::random());
            Record::new(
                RecordType::new(record_type),
                id.to_string(),
                json!({ "body": format!("{} {}", base_text, i) }),
            )
        })
        .collect()
}
