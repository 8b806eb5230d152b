//! Index write sink.

use reindex_types::{RecordType, WriteOperation};

use crate::error::ReindexError;

/// A sub-batch the sink stopped accepting partway through.
#[derive(Debug)]
pub struct PartialSubmit {
    /// Operations taken before the failure. The final flush commits them.
    pub accepted: usize,
    pub error: ReindexError,
}

impl From<ReindexError> for PartialSubmit {
    fn from(error: ReindexError) -> Self {
        Self { accepted: 0, error }
    }
}

/// Destination of write operations.
///
/// `submit` and `submit_all` are called concurrently from every
/// processing thread. `purge_all`, `optimize` and `flush` are only called
/// by the coordinator, never while batches are being processed.
pub trait IndexSink: Send + Sync {
    fn submit(&self, op: WriteOperation) -> Result<(), ReindexError>;

    /// Submit a sub-batch. Returns the number of operations accepted,
    /// also when the batch fails partway through.
    fn submit_all(&self, ops: Vec<WriteOperation>) -> Result<usize, PartialSubmit> {
        let count = ops.len();
        for (accepted, op) in ops.into_iter().enumerate() {
            self.submit(op)
                .map_err(|error| PartialSubmit { accepted, error })?;
        }
        Ok(count)
    }

    /// Remove every document of a type.
    fn purge_all(&self, record_type: &RecordType) -> Result<(), ReindexError>;

    /// Compact the documents of a type.
    fn optimize(&self, record_type: &RecordType) -> Result<(), ReindexError>;

    /// Make everything submitted so far durable and visible.
    fn flush(&self, record_types: &[RecordType]) -> Result<(), ReindexError>;
}
