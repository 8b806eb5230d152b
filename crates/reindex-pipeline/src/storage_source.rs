//! [`RecordSource`] backed by the RocksDB record store.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use reindex_storage::{RecordStore, StorageError};
use reindex_types::{Record, RecordId, RecordType};

use crate::error::ReindexError;
use crate::source::RecordSource;

pub struct StorageRecordSource {
    store: Arc<RecordStore>,
}

impl StorageRecordSource {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }
}

fn map_storage_error(err: StorageError) -> ReindexError {
    match err {
        StorageError::Timeout {
            record_type,
            timeout,
        } => ReindexError::TransactionTimeout {
            record_type,
            timeout,
        },
        other => ReindexError::Storage(other),
    }
}

impl RecordSource for StorageRecordSource {
    /// Advisory only, so the metadata estimate is enough.
    fn count_records(&self, record_type: &RecordType) -> Result<u64, ReindexError> {
        self.store
            .estimate_records(record_type)
            .map_err(map_storage_error)
    }

    fn page_identifiers(
        &self,
        record_type: &RecordType,
        after: Option<&RecordId>,
        page_size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<RecordId>, ReindexError> {
        self.store
            .page_ids(record_type, after, page_size, timeout)
            .map_err(map_storage_error)
    }

    fn load_records(
        &self,
        record_type: &RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<Option<Record>>, ReindexError> {
        self.store
            .load_records(record_type, ids)
            .map_err(map_storage_error)
    }

    fn release_resources(&self) -> Result<(), ReindexError> {
        debug!("Releasing record store after mass indexing");
        self.store.flush().map_err(map_storage_error)
    }
}
