//! Per-type identifier scanning.
//!
//! A [`RecordScanner`] pages through the identifiers of one record type in
//! ascending order and turns every page into an [`IdentifierBatch`] for the
//! processing pool. Each page needs one unit of the backpressure gate, so a
//! scanner that runs ahead of the processors parks on the gate instead of
//! queueing unbounded work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reindex_types::{RecordId, RecordType};

use crate::error::ReindexError;
use crate::failure::FailureLatch;
use crate::gate::{Admission, BackpressureGate};
use crate::processor::{BatchPool, IdentifierBatch};
use crate::progress::ProgressReporter;
use crate::source::RecordSource;
use crate::task::run_blocking;
use crate::tracker::CompletionTracker;

/// Collaborators shared by every scanner of a run.
pub struct ScanContext {
    pub source: Arc<dyn RecordSource>,
    pub gate: Arc<BackpressureGate>,
    pub pool: Arc<BatchPool>,
    pub latch: Arc<FailureLatch>,
    pub progress: ProgressReporter,
    pub ids_per_batch: usize,
    pub transaction_timeout: Option<Duration>,
}

/// What a scanner handed off before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub batches: u64,
    pub ids_scanned: u64,
}

pub struct RecordScanner {
    record_type: RecordType,
    tracker: Arc<CompletionTracker>,
    producing: Arc<AtomicBool>,
    ctx: Arc<ScanContext>,
}

impl RecordScanner {
    /// `producing` is cleared once the scanner stops, however it stops.
    pub fn new(
        tracker: Arc<CompletionTracker>,
        producing: Arc<AtomicBool>,
        ctx: Arc<ScanContext>,
    ) -> Self {
        Self {
            record_type: tracker.record_type().clone(),
            tracker,
            producing,
            ctx,
        }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    async fn next_page(&self, after: Option<RecordId>) -> Result<Vec<RecordId>, ReindexError> {
        let source = self.ctx.source.clone();
        let record_type = self.record_type.clone();
        let page_size = self.ctx.ids_per_batch;
        let timeout = self.ctx.transaction_timeout;

        run_blocking(move || {
            source.page_identifiers(&record_type, after.as_ref(), page_size, timeout)
        })
        .await
    }

    /// Scan until the type is exhausted, the run is cancelled or a page
    /// read fails. Read failures go to the failure latch.
    pub async fn run(self) -> ScanStats {
        let ctx = self.ctx.clone();
        let token = ctx.latch.token().clone();
        let mut stats = ScanStats::default();
        let mut cursor: Option<RecordId> = None;

        debug!(record_type = %self.record_type, "Scanner started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let ids = match self.next_page(cursor.clone()).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(record_type = %self.record_type, error = %e, "Identifier scan failed");
                    ctx.latch.record(e);
                    break;
                }
            };
            if ids.is_empty() {
                break;
            }
            let exhausted = ids.len() < ctx.ids_per_batch;

            match ctx.gate.acquire(1, &token).await {
                Admission::Admitted => {}
                Admission::Disabled | Admission::Cancelled => break,
            }

            let len = ids.len() as u64;
            cursor = ids.last().cloned();
            let batch = IdentifierBatch {
                record_type: self.record_type.clone(),
                ids,
                offset: stats.ids_scanned,
            };

            self.tracker.register(1);
            // The pool refuses handoffs once shutdown has begun
            if !ctx.pool.submit(batch, self.tracker.clone()) {
                self.tracker.complete(1);
                ctx.gate.release(1);
                break;
            }

            stats.batches += 1;
            stats.ids_scanned += len;
            ctx.progress.ids_scanned(&self.record_type, len);

            if exhausted {
                break;
            }
        }

        info!(
            record_type = %self.record_type,
            batches = stats.batches,
            ids = stats.ids_scanned,
            cancelled = token.is_cancelled(),
            "Scanner finished"
        );
        stats
    }
}

impl Drop for RecordScanner {
    fn drop(&mut self) {
        self.producing.store(false, Ordering::SeqCst);
        self.tracker.finish_scanning();
        if std::thread::panicking() {
            self.ctx.latch.record(ReindexError::WorkerPanic(format!(
                "scanner for {} panicked",
                self.record_type
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryIndexSink, MemoryRecordStore};
    use crate::processor::BatchProcessor;
    use crate::progress::ProgressMonitor;
    use reindex_types::{Record, WriteOperation};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        sink: Arc<MemoryIndexSink>,
        tracker: Arc<CompletionTracker>,
        producing: Arc<AtomicBool>,
        ctx: Arc<ScanContext>,
        monitor: ProgressMonitor,
    }

    fn identity(record: &Record) -> Result<Option<WriteOperation>, ReindexError> {
        Ok(Some(WriteOperation::new(
            record.record_type.clone(),
            record.id.clone(),
            "",
            "{}",
        )))
    }

    fn fixture(records: usize, ids_per_batch: usize, gate_capacity: usize) -> Fixture {
        let book = RecordType::new("book");
        let store = Arc::new(MemoryRecordStore::new());
        for i in 0..records {
            store.insert(Record::new(book.clone(), format!("{:04}", i), json!({})));
        }
        let sink = Arc::new(MemoryIndexSink::new());
        let monitor = ProgressMonitor::spawn(std::slice::from_ref(&book), Vec::new());

        let gate = Arc::new(BackpressureGate::new(gate_capacity));
        gate.mark_ready();
        let tracker = Arc::new(CompletionTracker::new(book));
        let latch = Arc::new(FailureLatch::new(
            CancellationToken::new(),
            gate.clone(),
            vec![tracker.clone()],
        ));
        let processor = Arc::new(BatchProcessor::new(
            store.clone(),
            Arc::new(identity),
            sink.clone(),
            3,
            monitor.reporter(),
            latch.token().clone(),
        ));
        let pool = Arc::new(BatchPool::new(
            processor,
            2,
            gate.clone(),
            latch.clone(),
            monitor.reporter(),
        ));

        let ctx = Arc::new(ScanContext {
            source: store.clone(),
            gate,
            pool,
            latch,
            progress: monitor.reporter(),
            ids_per_batch,
            transaction_timeout: None,
        });

        Fixture {
            store,
            sink,
            tracker,
            producing: Arc::new(AtomicBool::new(true)),
            ctx,
            monitor,
        }
    }

    impl Fixture {
        fn scanner(&self) -> RecordScanner {
            RecordScanner::new(self.tracker.clone(), self.producing.clone(), self.ctx.clone())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scans_every_identifier_once() {
        let f = fixture(25, 10, 8);

        let stats = f.scanner().run().await;
        f.tracker.wait_quiescent().await;
        f.ctx.pool.drain().await;

        assert_eq!(stats, ScanStats { batches: 3, ids_scanned: 25 });
        assert_eq!(f.sink.document_count(), 25);
        assert!(!f.producing.load(Ordering::SeqCst));
        assert_eq!(f.ctx.gate.occupancy(), 0);
        // Short last page ends the scan without an extra read
        assert_eq!(f.store.page_calls(), 3);

        let snapshot = f.monitor.close().await;
        assert_eq!(snapshot.get(&RecordType::new("book")).unwrap().ids_scanned, 25);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exact_multiple_needs_one_empty_page() {
        let f = fixture(20, 10, 8);

        let stats = f.scanner().run().await;
        f.ctx.pool.drain().await;

        assert_eq!(stats.batches, 2);
        assert_eq!(f.store.page_calls(), 3);
        assert_eq!(f.sink.document_count(), 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_type_finishes_without_batches() {
        let f = fixture(0, 10, 8);

        let stats = f.scanner().run().await;

        assert_eq!(stats, ScanStats::default());
        assert!(f.tracker.is_quiescent());
        assert_eq!(f.sink.submit_all_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_page_failure_is_latched() {
        let f = fixture(30, 10, 8);
        f.store.fail_page_on_call(2);

        let stats = f.scanner().run().await;
        f.ctx.pool.drain().await;

        assert_eq!(stats.batches, 1);
        assert!(f.ctx.latch.is_cancelled());
        assert!(matches!(f.ctx.latch.take(), Some(ReindexError::Source(_))));
        assert!(f.tracker.is_quiescent());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_scanner_hands_off_nothing() {
        let f = fixture(30, 10, 8);
        f.ctx.latch.trigger_shutdown();

        let stats = f.scanner().run().await;

        assert_eq!(stats.batches, 0);
        assert_eq!(f.store.page_calls(), 0);
        assert!(f.tracker.state().scanning_finished);
        assert!(!f.producing.load(Ordering::SeqCst));
    }
}
