//! RocksDB wrapper for the record store.
//!
//! Provides:
//! - Database open with discovery of existing record column families
//! - Single and atomic multi-record writes
//! - Identifier paging in ascending key order, bounded by a read timeout
//! - Bulk record loads that preserve request order

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tracing::{debug, info};

use reindex_types::{Record, RecordId, RecordType};

use crate::column_families::{cf_name, record_cf_options, record_type_of};
use crate::error::StorageError;

type Db = DBWithThreadMode<MultiThreaded>;

/// Record counts per type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub record_counts: Vec<(RecordType, u64)>,
}

impl StoreStats {
    pub fn total(&self) -> u64 {
        self.record_counts.iter().map(|(_, n)| n).sum()
    }
}

/// Primary record store backed by RocksDB
pub struct RecordStore {
    db: Db,
    /// Serializes column family creation
    cf_lock: Mutex<()>,
}

impl RecordStore {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening record store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        // A fresh directory has no column family list yet
        let existing = Db::list_cf(&db_opts, path).unwrap_or_default();
        let descriptors: Vec<ColumnFamilyDescriptor> = existing
            .iter()
            .filter(|name| record_type_of(name).is_some())
            .map(|name| ColumnFamilyDescriptor::new(name, record_cf_options()))
            .collect();
        debug!(
            column_families = descriptors.len(),
            "Discovered record column families"
        );

        let db = Db::open_cf_descriptors(&db_opts, path, descriptors)?;

        Ok(Self {
            db,
            cf_lock: Mutex::new(()),
        })
    }

    fn existing_cf(&self, record_type: &RecordType) -> Option<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(&cf_name(record_type))
    }

    fn cf_or_create(
        &self,
        record_type: &RecordType,
    ) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        if let Some(cf) = self.existing_cf(record_type) {
            return Ok(cf);
        }

        let name = cf_name(record_type);
        {
            let _guard = self.cf_lock.lock().unwrap_or_else(|e| e.into_inner());
            if self.db.cf_handle(&name).is_none() {
                self.db.create_cf(&name, &record_cf_options())?;
                info!(record_type = %record_type, "Created column family");
            }
        }

        self.db
            .cf_handle(&name)
            .ok_or(StorageError::ColumnFamilyNotFound(name))
    }

    /// Store a record, replacing any record with the same type and id.
    pub fn put_record(&self, record: &Record) -> Result<(), StorageError> {
        let cf = self.cf_or_create(&record.record_type)?;
        self.db
            .put_cf(&cf, record.id.as_bytes(), record.to_bytes()?)?;
        debug!(record_type = %record.record_type, id = %record.id, "Stored record");
        Ok(())
    }

    /// Store many records atomically. Returns the number written.
    pub fn put_records(&self, records: &[Record]) -> Result<usize, StorageError> {
        let mut handles: HashMap<&RecordType, Arc<BoundColumnFamily<'_>>> = HashMap::new();
        for record in records {
            if !handles.contains_key(&record.record_type) {
                handles.insert(&record.record_type, self.cf_or_create(&record.record_type)?);
            }
        }

        let mut batch = WriteBatch::default();
        for record in records {
            let cf = handles
                .get(&record.record_type)
                .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name(&record.record_type)))?;
            batch.put_cf(cf, record.id.as_bytes(), record.to_bytes()?);
        }

        self.db.write(batch)?;
        debug!(count = records.len(), "Stored record batch");
        Ok(records.len())
    }

    /// Get a single record.
    pub fn get_record(
        &self,
        record_type: &RecordType,
        id: &RecordId,
    ) -> Result<Option<Record>, StorageError> {
        let Some(cf) = self.existing_cf(record_type) else {
            return Ok(None);
        };
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a record. Deleting a missing record is a no-op.
    pub fn delete_record(&self, record_type: &RecordType, id: &RecordId) -> Result<(), StorageError> {
        if let Some(cf) = self.existing_cf(record_type) {
            self.db.delete_cf(&cf, id.as_bytes())?;
        }
        Ok(())
    }

    /// RocksDB's key estimate for a type, read from table metadata
    /// without scanning. Exact for insert-only data, otherwise approximate.
    pub fn estimate_records(&self, record_type: &RecordType) -> Result<u64, StorageError> {
        let Some(cf) = self.existing_cf(record_type) else {
            return Ok(0);
        };
        let estimate = self
            .db
            .property_int_value_cf(&cf, rocksdb::properties::ESTIMATE_NUM_KEYS)?;
        Ok(estimate.unwrap_or(0))
    }

    /// Count the records of a type by scanning it. Unknown types have zero records.
    pub fn count_records(&self, record_type: &RecordType) -> Result<u64, StorageError> {
        let Some(cf) = self.existing_cf(record_type) else {
            return Ok(0);
        };
        let mut count = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Fetch up to `limit` identifiers strictly after `after`, in ascending order.
    ///
    /// When `timeout` is set the read fails with [`StorageError::Timeout`]
    /// once it has been running for longer than the timeout.
    pub fn page_ids(
        &self,
        record_type: &RecordType,
        after: Option<&RecordId>,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<RecordId>, StorageError> {
        let Some(cf) = self.existing_cf(record_type) else {
            return Ok(Vec::new());
        };

        let mode = match after {
            Some(id) => IteratorMode::From(id.as_bytes(), Direction::Forward),
            None => IteratorMode::Start,
        };

        let started = Instant::now();
        let mut ids = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(&cf, mode) {
            if ids.len() >= limit {
                break;
            }
            if let Some(timeout) = timeout {
                if started.elapsed() > timeout {
                    return Err(StorageError::Timeout {
                        record_type: record_type.to_string(),
                        timeout,
                    });
                }
            }

            let (key, _) = item?;
            if after.is_some_and(|after| key.as_ref() == after.as_bytes()) {
                continue;
            }
            ids.push(RecordId::from_bytes(&key)?);
        }

        Ok(ids)
    }

    /// Load records by id. The result is aligned with `ids`; missing records are `None`.
    pub fn load_records(
        &self,
        record_type: &RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<Option<Record>>, StorageError> {
        let Some(cf) = self.existing_cf(record_type) else {
            return Ok(vec![None; ids.len()]);
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match self.db.get_cf(&cf, id.as_bytes())? {
                Some(bytes) => Some(Record::from_bytes(&bytes)?),
                None => None,
            };
            records.push(record);
        }
        Ok(records)
    }

    /// Record types that have a column family.
    pub fn record_types(&self) -> Result<Vec<RecordType>, StorageError> {
        let names = Db::list_cf(&Options::default(), self.db.path())?;
        let mut types: Vec<RecordType> = names.iter().filter_map(|n| record_type_of(n)).collect();
        types.sort();
        Ok(types)
    }

    /// Flush all record column families to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        for record_type in self.record_types()? {
            if let Some(cf) = self.existing_cf(&record_type) {
                self.db.flush_cf(&cf)?;
            }
        }
        debug!("Flushed record store");
        Ok(())
    }

    /// Per-type record counts.
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let mut record_counts = Vec::new();
        for record_type in self.record_types()? {
            let count = self.count_records(&record_type)?;
            record_counts.push((record_type, count));
        }
        Ok(StoreStats { record_counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (RecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn book(id: &str) -> Record {
        Record::new(RecordType::new("book"), id, json!({ "title": format!("Book {}", id) }))
    }

    #[test]
    fn test_put_and_get_record() {
        let (store, _dir) = create_test_store();
        let record = book("0001");
        store.put_record(&record).unwrap();

        let loaded = store
            .get_record(&RecordType::new("book"), &RecordId::new("0001"))
            .unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_unknown_type_is_empty() {
        let (store, _dir) = create_test_store();
        let ty = RecordType::new("ghost");
        assert_eq!(store.count_records(&ty).unwrap(), 0);
        assert_eq!(store.estimate_records(&ty).unwrap(), 0);
        assert!(store.page_ids(&ty, None, 10, None).unwrap().is_empty());
        assert_eq!(
            store.load_records(&ty, &[RecordId::new("x")]).unwrap(),
            vec![None]
        );
    }

    #[test]
    fn test_estimate_matches_count_for_fresh_inserts() {
        let (store, _dir) = create_test_store();
        let records: Vec<Record> = (0..40).map(|i| book(&format!("{:04}", i))).collect();
        store.put_records(&records).unwrap();
        let ty = RecordType::new("book");

        assert_eq!(store.count_records(&ty).unwrap(), 40);
        assert_eq!(store.estimate_records(&ty).unwrap(), 40);
    }

    #[test]
    fn test_page_ids_ascending_after_cursor() {
        let (store, _dir) = create_test_store();
        let records: Vec<Record> = (0..25).map(|i| book(&format!("{:04}", i))).collect();
        store.put_records(&records).unwrap();
        let ty = RecordType::new("book");

        let first = store.page_ids(&ty, None, 10, None).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].as_str(), "0000");
        assert_eq!(first[9].as_str(), "0009");

        let second = store.page_ids(&ty, first.last(), 10, None).unwrap();
        assert_eq!(second[0].as_str(), "0010");

        let third = store.page_ids(&ty, second.last(), 10, None).unwrap();
        assert_eq!(third.len(), 5);
        assert_eq!(third[4].as_str(), "0024");

        let done = store.page_ids(&ty, third.last(), 10, None).unwrap();
        assert!(done.is_empty());
    }

    #[test]
    fn test_page_after_deleted_cursor() {
        let (store, _dir) = create_test_store();
        store
            .put_records(&[book("a"), book("b"), book("c")])
            .unwrap();
        let ty = RecordType::new("book");
        store.delete_record(&ty, &RecordId::new("b")).unwrap();

        // The cursor no longer exists; paging resumes at the next key
        let page = store.page_ids(&ty, Some(&RecordId::new("b")), 10, None).unwrap();
        assert_eq!(page, vec![RecordId::new("c")]);
    }

    #[test]
    fn test_page_ids_zero_timeout_fails() {
        let (store, _dir) = create_test_store();
        store.put_record(&book("0001")).unwrap();

        let result = store.page_ids(
            &RecordType::new("book"),
            None,
            10,
            Some(Duration::from_nanos(1)),
        );
        assert!(matches!(result, Err(StorageError::Timeout { .. })));
    }

    #[test]
    fn test_load_records_preserves_order_and_gaps() {
        let (store, _dir) = create_test_store();
        store.put_records(&[book("1"), book("3")]).unwrap();

        let ids = vec![RecordId::new("3"), RecordId::new("2"), RecordId::new("1")];
        let loaded = store.load_records(&RecordType::new("book"), &ids).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].as_ref().unwrap().id.as_str(), "3");
        assert!(loaded[1].is_none());
        assert_eq!(loaded[2].as_ref().unwrap().id.as_str(), "1");
    }

    #[test]
    fn test_record_types_and_stats_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RecordStore::open(temp_dir.path()).unwrap();
            store.put_records(&[book("1"), book("2")]).unwrap();
            store
                .put_record(&Record::new(RecordType::new("author"), "x", json!({})))
                .unwrap();
            store.flush().unwrap();
        }

        let store = RecordStore::open(temp_dir.path()).unwrap();
        let types = store.record_types().unwrap();
        assert_eq!(types, vec![RecordType::new("author"), RecordType::new("book")]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.record_counts[1], (RecordType::new("book"), 2));
    }
}
