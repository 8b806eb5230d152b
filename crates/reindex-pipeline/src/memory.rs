//! In-memory collaborators for tests and local experiments.
//!
//! [`MemoryRecordStore`] and [`MemoryIndexSink`] behave like the RocksDB
//! and Tantivy adapters, and additionally count calls, inject failures
//! and can be paused to hold processors mid-run.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, RwLock};
use std::time::Duration;

use reindex_types::{Record, RecordId, RecordType, WriteOperation};

use crate::error::ReindexError;
use crate::sink::{IndexSink, PartialSubmit};
use crate::source::RecordSource;

const NO_FAILURE: usize = 0;

/// Whether the 1-based `call` is the one armed in `fail_at`.
fn injected(fail_at: &AtomicUsize, call: usize) -> bool {
    let at = fail_at.load(Ordering::SeqCst);
    at != NO_FAILURE && at == call
}

/// Ordered in-memory record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<RecordType, BTreeMap<RecordId, Record>>>,
    page_calls: AtomicUsize,
    load_calls: AtomicUsize,
    /// 1-based load call that fails, or NO_FAILURE
    fail_load_at: AtomicUsize,
    /// 1-based page call that fails, or NO_FAILURE
    fail_page_at: AtomicUsize,
    load_delay: Mutex<Option<Duration>>,
    released: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Record) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub fn remove(&self, record_type: &RecordType, id: &RecordId) -> Option<Record> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.get_mut(record_type).and_then(|m| m.remove(id))
    }

    /// Make the `n`-th call to `load_records` (1-based) fail.
    pub fn fail_load_on_call(&self, n: usize) {
        self.fail_load_at.store(n, Ordering::SeqCst);
    }

    /// Make the `n`-th call to `page_identifiers` (1-based) fail.
    pub fn fail_page_on_call(&self, n: usize) {
        self.fail_page_at.store(n, Ordering::SeqCst);
    }

    /// Sleep this long in every `load_records` call.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl RecordSource for MemoryRecordStore {
    fn count_records(&self, record_type: &RecordType) -> Result<u64, ReindexError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(record_type).map_or(0, |m| m.len() as u64))
    }

    fn page_identifiers(
        &self,
        record_type: &RecordType,
        after: Option<&RecordId>,
        page_size: usize,
        _timeout: Option<Duration>,
    ) -> Result<Vec<RecordId>, ReindexError> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if injected(&self.fail_page_at, call) {
            return Err(ReindexError::Source(format!(
                "injected failure on page call {}",
                call
            )));
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let Some(of_type) = records.get(record_type) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(id) => Bound::Excluded(id.clone()),
            None => Bound::Unbounded,
        };
        Ok(of_type
            .range((lower, Bound::Unbounded))
            .take(page_size)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn load_records(
        &self,
        record_type: &RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<Option<Record>>, ReindexError> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if injected(&self.fail_load_at, call) {
            return Err(ReindexError::Source(format!(
                "injected failure on load call {}",
                call
            )));
        }

        let delay = *self.load_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let of_type = records.get(record_type);
        Ok(ids
            .iter()
            .map(|id| of_type.and_then(|m| m.get(id)).cloned())
            .collect())
    }

    fn release_resources(&self) -> Result<(), ReindexError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct SinkCalls {
    submit_all: usize,
    purged: Vec<RecordType>,
    optimized: Vec<RecordType>,
    flushed: Vec<Vec<RecordType>>,
}

/// In-memory index sink keyed by `(type, id)`.
#[derive(Default)]
pub struct MemoryIndexSink {
    documents: Mutex<HashMap<String, WriteOperation>>,
    calls: Mutex<SinkCalls>,
    submitted: AtomicUsize,
    fail_submit_at: AtomicUsize,
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl MemoryIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th submitted operation (1-based) fail. Zero disarms.
    pub fn fail_submit_on_call(&self, n: usize) {
        self.fail_submit_at.store(n, Ordering::SeqCst);
    }

    /// Block every submission until [`resume`](Self::resume).
    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.resumed.notify_all();
    }

    fn wait_while_paused(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(|e| e.into_inner());
        while *paused {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Total operations accepted, counting replacements.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Distinct documents currently held.
    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn document_count_of(&self, record_type: &RecordType) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|op| &op.record_type == record_type)
            .count()
    }

    pub fn document(&self, record_type: &RecordType, id: &RecordId) -> Option<WriteOperation> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&reindex_types::index_key(record_type, id))
            .cloned()
    }

    /// Every held document, ordered by index key.
    pub fn documents(&self) -> Vec<WriteOperation> {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        let mut docs: Vec<_> = documents.values().cloned().collect();
        docs.sort_by_key(WriteOperation::index_key);
        docs
    }

    pub fn submit_all_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).submit_all
    }

    pub fn purged(&self) -> Vec<RecordType> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).purged.clone()
    }

    pub fn optimized(&self) -> Vec<RecordType> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .optimized
            .clone()
    }

    /// Type lists of every flush call, in call order.
    pub fn flushes(&self) -> Vec<Vec<RecordType>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).flushed.clone()
    }
}

impl IndexSink for MemoryIndexSink {
    fn submit(&self, op: WriteOperation) -> Result<(), ReindexError> {
        self.wait_while_paused();

        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        if injected(&self.fail_submit_at, n) {
            return Err(ReindexError::Sink(format!(
                "injected failure on operation {}",
                n
            )));
        }

        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op.index_key(), op);
        Ok(())
    }

    fn submit_all(&self, ops: Vec<WriteOperation>) -> Result<usize, PartialSubmit> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).submit_all += 1;
        let count = ops.len();
        for (accepted, op) in ops.into_iter().enumerate() {
            self.submit(op)
                .map_err(|error| PartialSubmit { accepted, error })?;
        }
        Ok(count)
    }

    fn purge_all(&self, record_type: &RecordType) -> Result<(), ReindexError> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, op| &op.record_type != record_type);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .purged
            .push(record_type.clone());
        Ok(())
    }

    fn optimize(&self, record_type: &RecordType) -> Result<(), ReindexError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .optimized
            .push(record_type.clone());
        Ok(())
    }

    fn flush(&self, record_types: &[RecordType]) -> Result<(), ReindexError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flushed
            .push(record_types.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(ids: &[&str]) -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        for id in ids {
            store.insert(Record::new(RecordType::new("book"), *id, json!({})));
        }
        store
    }

    #[test]
    fn test_store_pages_in_order() {
        let store = store_with(&["c", "a", "b", "d"]);
        let ty = RecordType::new("book");

        let first = store.page_identifiers(&ty, None, 3, None).unwrap();
        assert_eq!(
            first,
            vec![RecordId::new("a"), RecordId::new("b"), RecordId::new("c")]
        );
        let rest = store.page_identifiers(&ty, first.last(), 3, None).unwrap();
        assert_eq!(rest, vec![RecordId::new("d")]);
        assert_eq!(store.page_calls(), 2);
        assert_eq!(store.count_records(&ty).unwrap(), 4);
    }

    #[test]
    fn test_store_injected_failures() {
        let store = store_with(&["a"]);
        let ty = RecordType::new("book");
        store.fail_load_on_call(2);
        store.fail_page_on_call(1);

        assert!(store.page_identifiers(&ty, None, 1, None).is_err());
        assert!(store.page_identifiers(&ty, None, 1, None).is_ok());
        assert!(store.load_records(&ty, &[RecordId::new("a")]).is_ok());
        assert!(store.load_records(&ty, &[RecordId::new("a")]).is_err());
    }

    #[test]
    fn test_sink_upserts_and_purges() {
        let sink = MemoryIndexSink::new();
        let book = RecordType::new("book");
        let author = RecordType::new("author");
        let op = |ty: &RecordType, id: &str| {
            WriteOperation::new(ty.clone(), RecordId::new(id), "t", "{}")
        };

        sink.submit_all(vec![op(&book, "1"), op(&book, "1"), op(&author, "1")])
            .unwrap();
        assert_eq!(sink.submitted(), 3);
        assert_eq!(sink.document_count(), 2);

        sink.purge_all(&book).unwrap();
        assert_eq!(sink.document_count_of(&book), 0);
        assert_eq!(sink.document_count_of(&author), 1);
        assert_eq!(sink.purged(), vec![book]);
    }

    #[test]
    fn test_sink_reports_accepted_count_on_failure() {
        let sink = MemoryIndexSink::new();
        let ops: Vec<_> = (0..5)
            .map(|i| {
                WriteOperation::new(RecordType::new("book"), RecordId::new(i.to_string()), "t", "{}")
            })
            .collect();
        sink.fail_submit_on_call(4);

        let partial = sink.submit_all(ops).unwrap_err();
        assert_eq!(partial.accepted, 3);
        assert!(matches!(partial.error, ReindexError::Sink(_)));
        assert_eq!(sink.document_count(), 3);
    }

    #[test]
    fn test_sink_pause_blocks_until_resume() {
        let sink = std::sync::Arc::new(MemoryIndexSink::new());
        sink.pause();

        let worker = {
            let sink = sink.clone();
            std::thread::spawn(move || {
                sink.submit(WriteOperation::new(
                    RecordType::new("book"),
                    RecordId::new("1"),
                    "t",
                    "{}",
                ))
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.document_count(), 0);

        sink.resume();
        worker.join().unwrap().unwrap();
        assert_eq!(sink.document_count(), 1);
    }
}
