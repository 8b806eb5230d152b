//! [`IndexSink`] writing to the Tantivy search index.

use std::sync::Arc;

use tracing::debug;

use reindex_search::{SearchError, SearchIndexer};
use reindex_types::{RecordType, WriteOperation};

use crate::error::ReindexError;
use crate::sink::{IndexSink, PartialSubmit};

/// Upserts into a shared [`SearchIndexer`].
///
/// Nothing is visible to searchers until `flush` commits.
pub struct TantivyIndexSink {
    indexer: Arc<SearchIndexer>,
}

impl TantivyIndexSink {
    pub fn new(indexer: Arc<SearchIndexer>) -> Self {
        Self { indexer }
    }
}

impl IndexSink for TantivyIndexSink {
    fn submit(&self, op: WriteOperation) -> Result<(), ReindexError> {
        self.indexer.upsert(&op)?;
        Ok(())
    }

    fn submit_all(&self, ops: Vec<WriteOperation>) -> Result<usize, PartialSubmit> {
        self.indexer.upsert_batch(&ops).map_err(|e| match e {
            SearchError::PartialBatch { indexed, source } => PartialSubmit {
                accepted: indexed,
                error: ReindexError::Search(*source),
            },
            other => ReindexError::Search(other).into(),
        })
    }

    fn purge_all(&self, record_type: &RecordType) -> Result<(), ReindexError> {
        self.indexer.delete_type(record_type)?;
        Ok(())
    }

    fn optimize(&self, record_type: &RecordType) -> Result<(), ReindexError> {
        // Segments hold every type; after the first type this is a no-op
        let segments = self.indexer.merge_segments()?;
        debug!(record_type = %record_type, segments, "Merged index segments");
        Ok(())
    }

    fn flush(&self, record_types: &[RecordType]) -> Result<(), ReindexError> {
        let opstamp = self.indexer.commit()?;
        debug!(record_types = ?record_types, opstamp, "Flushed search index");
        Ok(())
    }
}
