//! Tantivy index management.
//!
//! Handles index creation, opening, and read-side statistics.

use std::path::{Path, PathBuf};

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use reindex_types::{RecordId, RecordType};

use crate::error::SearchError;
use crate::schema::{build_reindex_schema, SearchSchema};

/// Writer heap when the settings do not name one
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Where the index lives and how much heap its single writer gets.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub index_path: PathBuf,
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    /// Override the writer heap; zero falls back to the default.
    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = if mb == 0 { DEFAULT_WRITER_MEMORY_MB } else { mb };
        self
    }

    fn writer_budget_bytes(&self) -> usize {
        self.writer_memory_mb * 1024 * 1024
    }
}

/// The reindex target: a Tantivy index with the generic record schema.
pub struct SearchIndex {
    index: Index,
    schema: SearchSchema,
    config: SearchIndexConfig,
}

impl SearchIndex {
    /// Open the index at the configured path, creating it when missing.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let index = open_or_create_index(&config.index_path)?;
        let schema = SearchSchema::from_schema(index.schema())?;
        info!(path = ?config.index_path, "Search index ready");

        Ok(Self {
            index,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    /// The index's only writer. Tantivy refuses a second one while it lives.
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let writer = self.index.writer(self.config.writer_budget_bytes())?;
        debug!(memory_mb = self.config.writer_memory_mb, "Index writer opened");
        Ok(writer)
    }

    /// Reader that sees everything committed so far.
    ///
    /// Reloads manually: the counts below are taken right after a commit.
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;
        Ok(reader)
    }

    /// Number of committed documents, optionally restricted to one record type.
    pub fn count_documents(&self, record_type: Option<&RecordType>) -> Result<u64, SearchError> {
        let searcher = self.reader()?.searcher();

        let count = match record_type {
            Some(record_type) => {
                let term = Term::from_field_text(self.schema.doc_type, record_type.as_str());
                searcher.search(&TermQuery::new(term, IndexRecordOption::Basic), &Count)?
            }
            None => searcher.search(&AllQuery, &Count)?,
        };
        Ok(count as u64)
    }

    /// Ids of committed documents of a record type, sorted, at most `limit`.
    pub fn document_ids(
        &self,
        record_type: &RecordType,
        limit: usize,
    ) -> Result<Vec<RecordId>, SearchError> {
        let searcher = self.reader()?.searcher();

        let term = Term::from_field_text(self.schema.doc_type, record_type.as_str());
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit.max(1)))?;

        let mut ids = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = doc.get_first(self.schema.doc_id).and_then(|v| v.as_str()) {
                ids.push(RecordId::new(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Number of searchable segments, used to observe merges.
    pub fn segment_count(&self) -> Result<usize, SearchError> {
        Ok(self.index.searchable_segment_ids()?.len())
    }
}

/// Open the index in `path`, or create it with the reindex schema.
pub fn open_or_create_index(path: &Path) -> Result<Index, SearchError> {
    if path.join("meta.json").exists() {
        debug!(path = ?path, "Opening existing index");
        return Ok(Index::open_in_dir(path)?);
    }

    info!(path = ?path, "Creating index");
    std::fs::create_dir_all(path)?;
    Ok(Index::create_in_dir(path, build_reindex_schema().schema().clone())?)
}
