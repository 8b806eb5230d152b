//! Primary store access used by scanners and processors.

use std::time::Duration;

use reindex_types::{Record, RecordId, RecordType};

use crate::error::ReindexError;

/// Read access to the primary record store.
///
/// Calls are blocking and may run concurrently from many threads.
pub trait RecordSource: Send + Sync {
    /// Advisory number of records of a type. Used for progress totals only.
    fn count_records(&self, record_type: &RecordType) -> Result<u64, ReindexError>;

    /// Up to `page_size` identifiers strictly after `after`, ascending.
    ///
    /// A page shorter than `page_size` means the type is exhausted. When
    /// `timeout` is set the read must fail rather than run past it.
    fn page_identifiers(
        &self,
        record_type: &RecordType,
        after: Option<&RecordId>,
        page_size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<RecordId>, ReindexError>;

    /// Records aligned with `ids`; records that no longer exist are `None`.
    fn load_records(
        &self,
        record_type: &RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<Option<Record>>, ReindexError>;

    /// Called once after the run has drained.
    fn release_resources(&self) -> Result<(), ReindexError> {
        Ok(())
    }
}
