//! Index writer wrapper used by the reindexing pipeline.
//!
//! The indexer wraps IndexWriter with shared access via Arc<Mutex>, so
//! many processing threads can submit documents concurrently. Documents
//! are not visible until commit() is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tantivy::{IndexWriter, Term};
use tracing::{debug, info, warn};

use reindex_types::{RecordType, WriteOperation};

use crate::document::operation_to_doc;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::SearchSchema;

/// Manages document writes for one index.
pub struct SearchIndexer {
    writer: Arc<Mutex<IndexWriter>>,
    schema: SearchSchema,
    /// Set by every write, cleared by a successful merge
    unmerged: AtomicBool,
}

impl SearchIndexer {
    /// Create a new indexer from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let writer = index.writer()?;
        let schema = index.schema().clone();

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            schema,
            unmerged: AtomicBool::new(true),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexWriter>, SearchError> {
        self.writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }

    /// Add or replace the document for a write operation.
    pub fn upsert(&self, op: &WriteOperation) -> Result<(), SearchError> {
        let doc = operation_to_doc(&self.schema, op);
        let writer = self.lock()?;

        writer.delete_term(Term::from_field_text(self.schema.doc_key, &op.index_key()));
        writer.add_document(doc)?;
        self.unmerged.store(true, Ordering::SeqCst);

        debug!(record_type = %op.record_type, doc_id = %op.doc_id, "Indexed document");
        Ok(())
    }

    /// Add or replace many documents under a single writer lock.
    ///
    /// A failure partway through reports how many documents were already
    /// added as [`SearchError::PartialBatch`].
    pub fn upsert_batch(&self, ops: &[WriteOperation]) -> Result<usize, SearchError> {
        let writer = self.lock()?;
        self.unmerged.store(true, Ordering::SeqCst);

        let mut count = 0;
        for op in ops {
            let doc = operation_to_doc(&self.schema, op);
            writer.delete_term(Term::from_field_text(self.schema.doc_key, &op.index_key()));
            if let Err(e) = writer.add_document(doc) {
                return Err(SearchError::PartialBatch {
                    indexed: count,
                    source: Box::new(e.into()),
                });
            }
            count += 1;
        }

        debug!(count, "Indexed document batch");
        Ok(count)
    }

    /// Delete every document of a record type.
    pub fn delete_type(&self, record_type: &RecordType) -> Result<(), SearchError> {
        let writer = self.lock()?;
        writer.delete_term(Term::from_field_text(
            self.schema.doc_type,
            record_type.as_str(),
        ));
        self.unmerged.store(true, Ordering::SeqCst);
        info!(record_type = %record_type, "Deleted all documents of type");
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self.lock()?;
        let opstamp = writer.commit()?;
        info!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Commit, merge all searchable segments into one and delete unused files.
    ///
    /// Segments hold every record type, so nothing happens when no write
    /// landed since the last merge; the result is then 0. A merge that
    /// conflicts with a background merge is logged and skipped.
    pub fn merge_segments(&self) -> Result<usize, SearchError> {
        let mut writer = self.lock()?;
        if !self.unmerged.load(Ordering::SeqCst) {
            debug!("No writes since last merge");
            return Ok(0);
        }
        writer.commit()?;

        let segment_ids = writer.index().searchable_segment_ids()?;
        let merged = segment_ids.len();
        if merged > 1 {
            if let Err(e) = writer.merge(&segment_ids).wait() {
                warn!(segments = merged, error = %e, "Segment merge skipped");
            }
        }

        writer.garbage_collect_files().wait()?;
        self.unmerged.store(false, Ordering::SeqCst);
        info!(segments = merged, "Merged index segments");
        Ok(merged)
    }
}
