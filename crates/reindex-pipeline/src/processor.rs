//! Batch processing: load, map and submit one identifier batch.
//!
//! Batches are handed to a [`BatchPool`], which runs at most
//! `threads_to_process` of them at once. The blocking work of a batch
//! runs on tokio's blocking thread pool. Whatever happens to a batch, its
//! [`BatchGuard`] completes it on the tracker and releases the gate.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use reindex_types::{RecordId, RecordType};

use crate::error::ReindexError;
use crate::failure::FailureLatch;
use crate::gate::BackpressureGate;
use crate::mapper::DocumentMapper;
use crate::progress::ProgressReporter;
use crate::sink::IndexSink;
use crate::source::RecordSource;
use crate::task::{join_error, run_blocking};
use crate::tracker::CompletionTracker;

/// Ordered identifiers of one record type, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierBatch {
    pub record_type: RecordType,
    pub ids: Vec<RecordId>,
    /// Position of the first id within the type's scan
    pub offset: u64,
}

/// Outcome counts for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub loaded: usize,
    pub submitted: usize,
    pub skipped: usize,
    /// Sub-batches left unprocessed because the run was cancelled
    pub abandoned_sub_batches: usize,
}

/// Blocking load/map/submit logic shared by all batches of a run.
pub struct BatchProcessor {
    source: Arc<dyn RecordSource>,
    mapper: Arc<dyn DocumentMapper>,
    sink: Arc<dyn IndexSink>,
    records_per_sub_batch: usize,
    progress: ProgressReporter,
    token: CancellationToken,
}

impl BatchProcessor {
    pub fn new(
        source: Arc<dyn RecordSource>,
        mapper: Arc<dyn DocumentMapper>,
        sink: Arc<dyn IndexSink>,
        records_per_sub_batch: usize,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> Self {
        Self {
            source,
            mapper,
            sink,
            records_per_sub_batch: records_per_sub_batch.max(1),
            progress,
            token,
        }
    }

    /// Process a batch sub-batch by sub-batch. Any error aborts the batch.
    pub fn process(&self, batch: &IdentifierBatch) -> Result<BatchStats, ReindexError> {
        let record_type = &batch.record_type;
        let mut stats = BatchStats::default();
        let mut chunks = batch.ids.chunks(self.records_per_sub_batch);

        for chunk in chunks.by_ref() {
            if self.token.is_cancelled() {
                stats.abandoned_sub_batches += 1;
                break;
            }

            let records = self.source.load_records(record_type, chunk)?;
            let loaded = records.iter().filter(|r| r.is_some()).count();
            let mut skipped = chunk.len().saturating_sub(loaded);

            let mut ops = Vec::with_capacity(loaded);
            for record in records.into_iter().flatten() {
                match self.mapper.to_write_operation(&record)? {
                    Some(op) => ops.push(op),
                    None => skipped += 1,
                }
            }

            let (submitted, failure) = if ops.is_empty() {
                (0, None)
            } else {
                match self.sink.submit_all(ops) {
                    Ok(n) => (n, None),
                    Err(partial) => (partial.accepted, Some(partial.error)),
                }
            };

            // Accepted operations are flushed even when the rest failed
            self.progress.records_loaded(record_type, loaded as u64);
            self.progress.operations_submitted(record_type, submitted as u64);
            self.progress.records_skipped(record_type, skipped as u64);
            if let Some(err) = failure {
                return Err(err);
            }

            stats.loaded += loaded;
            stats.submitted += submitted;
            stats.skipped += skipped;
        }
        stats.abandoned_sub_batches += chunks.count();

        Ok(stats)
    }
}

/// Completes a batch on its tracker and releases its gate unit on drop.
pub struct BatchGuard {
    record_type: RecordType,
    gate: Arc<BackpressureGate>,
    tracker: Arc<CompletionTracker>,
    progress: ProgressReporter,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.progress.batch_completed(&self.record_type);
        self.tracker.complete(1);
        self.gate.release(1);
    }
}

/// Bounded pool running identifier batches.
pub struct BatchPool {
    processor: Arc<BatchProcessor>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    gate: Arc<BackpressureGate>,
    latch: Arc<FailureLatch>,
    progress: ProgressReporter,
}

impl BatchPool {
    pub fn new(
        processor: Arc<BatchProcessor>,
        threads_to_process: usize,
        gate: Arc<BackpressureGate>,
        latch: Arc<FailureLatch>,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(threads_to_process.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            gate,
            latch,
            progress,
        }
    }

    /// Queue a batch whose gate unit is already held and that is already
    /// registered on `tracker`. Must be called from within the runtime.
    ///
    /// Returns `false` once the run is shutting down; the caller then still
    /// owns the gate unit and the registration. A shutdown that lands after
    /// this check is harmless: the queued task sees the cancelled token and
    /// drops the batch unprocessed.
    pub fn submit(&self, batch: IdentifierBatch, tracker: Arc<CompletionTracker>) -> bool {
        if self.latch.is_cancelled() || self.gate.is_disabled() {
            debug!(
                record_type = %batch.record_type,
                offset = batch.offset,
                "Refusing batch after shutdown"
            );
            return false;
        }

        let guard = BatchGuard {
            record_type: batch.record_type.clone(),
            gate: self.gate.clone(),
            tracker,
            progress: self.progress.clone(),
        };
        let processor = self.processor.clone();
        let permits = self.permits.clone();
        let latch = self.latch.clone();

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished batches so the set does not grow with the run
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                latch.record(join_error(e));
            }
        }

        tasks.spawn(async move {
            let _guard = guard;
            let token = latch.token().clone();

            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = token.cancelled() => return,
            };

            if token.is_cancelled() {
                debug!(
                    record_type = %batch.record_type,
                    offset = batch.offset,
                    "Skipping batch after cancellation"
                );
                return;
            }

            let record_type = batch.record_type.clone();
            let offset = batch.offset;
            match run_blocking(move || processor.process(&batch)).await {
                Ok(stats) => debug!(
                    record_type = %record_type,
                    offset,
                    submitted = stats.submitted,
                    skipped = stats.skipped,
                    "Batch processed"
                ),
                Err(e) => latch.record(e),
            }
        });
        true
    }

    /// Wait for every queued batch to finish.
    pub async fn drain(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let pending = tasks.len();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                self.latch.record(join_error(e));
            }
        }
        debug!(pending, "Processing pool drained");
    }
}
