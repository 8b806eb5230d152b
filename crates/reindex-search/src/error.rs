//! Search error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Writer lock poisoned by a panicking thread
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// A batch upsert failed after `indexed` documents were added
    #[error("Batch stopped after {indexed} documents: {source}")]
    PartialBatch {
        indexed: usize,
        source: Box<SearchError>,
    },
}
