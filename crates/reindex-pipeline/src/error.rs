//! Error types for the mass indexing pipeline.

use std::time::Duration;

use reindex_search::SearchError;
use reindex_storage::StorageError;
use reindex_types::ReindexTypesError;
use thiserror::Error;

/// Errors that can occur while configuring or running a mass index
#[derive(Error, Debug)]
pub enum ReindexError {
    /// Invalid pipeline configuration, reported synchronously by `start`
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start` was called more than once on the same indexer
    #[error("Mass indexer already started")]
    AlreadyStarted,

    /// No async runtime to run the pipeline on
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Record store operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Search index operation failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Generic record source failure
    #[error("Source error: {0}")]
    Source(String),

    /// A bounded identifier read ran past its deadline
    #[error("Transaction timeout reading {record_type} after {timeout:?}")]
    TransactionTimeout {
        record_type: String,
        timeout: Duration,
    },

    /// Converting a record into a write operation failed
    #[error("Mapping error for {record_type}/{id}: {message}")]
    Mapping {
        record_type: String,
        id: String,
        message: String,
    },

    /// Generic index sink failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A scanner, processor or the coordinator panicked
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

impl From<serde_json::Error> for ReindexError {
    fn from(err: serde_json::Error) -> Self {
        ReindexError::Serialization(err.to_string())
    }
}

impl From<ReindexTypesError> for ReindexError {
    fn from(err: ReindexTypesError) -> Self {
        match err {
            ReindexTypesError::Config(msg) => ReindexError::Config(msg),
            ReindexTypesError::Serialization(e) => ReindexError::Serialization(e.to_string()),
            ReindexTypesError::InvalidInput(msg) => ReindexError::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReindexError::Config("ids_per_batch must be >= 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: ids_per_batch must be >= 1"
        );

        assert_eq!(
            ReindexError::AlreadyStarted.to_string(),
            "Mass indexer already started"
        );

        let err = ReindexError::Mapping {
            record_type: "book".to_string(),
            id: "42".to_string(),
            message: "bad payload".to_string(),
        };
        assert_eq!(err.to_string(), "Mapping error for book/42: bad payload");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ReindexError = json_err.into();
        assert!(matches!(err, ReindexError::Serialization(_)));
    }

    #[test]
    fn test_from_storage_error() {
        let err: ReindexError = StorageError::Key("bad key".to_string()).into();
        assert!(matches!(err, ReindexError::Storage(_)));
    }
}
