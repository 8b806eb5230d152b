//! Storage layer error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A bounded read ran past its deadline
    #[error("Read of {record_type} exceeded {timeout:?}")]
    Timeout {
        record_type: String,
        timeout: Duration,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reindex_types::ReindexTypesError> for StorageError {
    fn from(err: reindex_types::ReindexTypesError) -> Self {
        match err {
            reindex_types::ReindexTypesError::InvalidInput(msg) => StorageError::Key(msg),
            other => StorageError::Serialization(other.to_string()),
        }
    }
}
