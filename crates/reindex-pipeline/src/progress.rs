//! Progress monitoring for mass indexing runs.
//!
//! Scanners and processors never touch shared counters directly. They
//! send deltas through a [`ProgressReporter`] to a single monitor task,
//! which folds them into per-type [`TypeProgress`] and forwards them to
//! the registered [`ProgressListener`]s in arrival order.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reindex_types::RecordType;

/// Counters for one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeProgress {
    /// Advisory count taken before scanning started
    pub total_estimate: u64,
    pub ids_scanned: u64,
    pub records_loaded: u64,
    pub operations_submitted: u64,
    /// Missing records plus records the mapper declined
    pub records_skipped: u64,
    pub batches_completed: u64,
}

impl TypeProgress {
    fn add(&mut self, other: &TypeProgress) {
        self.total_estimate += other.total_estimate;
        self.ids_scanned += other.ids_scanned;
        self.records_loaded += other.records_loaded;
        self.operations_submitted += other.operations_submitted;
        self.records_skipped += other.records_skipped;
        self.batches_completed += other.batches_completed;
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub per_type: BTreeMap<RecordType, TypeProgress>,
}

impl ProgressSnapshot {
    pub fn get(&self, record_type: &RecordType) -> Option<&TypeProgress> {
        self.per_type.get(record_type)
    }

    /// Sum over all record types.
    pub fn totals(&self) -> TypeProgress {
        let mut totals = TypeProgress::default();
        for progress in self.per_type.values() {
            totals.add(progress);
        }
        totals
    }
}

/// Receives progress updates from the monitor task.
///
/// Every callback gets the delta that was just applied and the updated
/// counters for the record type. Callbacks run on the monitor task one
/// at a time, so they should return quickly.
pub trait ProgressListener: Send + Sync {
    fn on_total_estimated(&self, _record_type: &RecordType, _total: u64) {}

    fn on_ids_scanned(&self, _record_type: &RecordType, _delta: u64, _progress: &TypeProgress) {}

    fn on_records_loaded(&self, _record_type: &RecordType, _delta: u64, _progress: &TypeProgress) {
    }

    fn on_operations_submitted(
        &self,
        _record_type: &RecordType,
        _delta: u64,
        _progress: &TypeProgress,
    ) {
    }

    fn on_finished(&self, _snapshot: &ProgressSnapshot) {}
}

/// A listener that ignores every update.
pub struct NoOpProgressListener;

impl ProgressListener for NoOpProgressListener {}

/// A listener that logs at info level every `every` submitted operations.
pub struct LoggingProgressListener {
    every: u64,
}

impl LoggingProgressListener {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl ProgressListener for LoggingProgressListener {
    fn on_total_estimated(&self, record_type: &RecordType, total: u64) {
        info!(record_type = %record_type, total, "Records to index");
    }

    fn on_operations_submitted(
        &self,
        record_type: &RecordType,
        delta: u64,
        progress: &TypeProgress,
    ) {
        let before = progress.operations_submitted.saturating_sub(delta);
        if before / self.every != progress.operations_submitted / self.every {
            info!(
                record_type = %record_type,
                submitted = progress.operations_submitted,
                total = progress.total_estimate,
                skipped = progress.records_skipped,
                "Mass indexing progress"
            );
        }
    }

    fn on_finished(&self, snapshot: &ProgressSnapshot) {
        let totals = snapshot.totals();
        info!(
            submitted = totals.operations_submitted,
            scanned = totals.ids_scanned,
            skipped = totals.records_skipped,
            batches = totals.batches_completed,
            "Mass indexing finished"
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    TotalEstimate,
    IdsScanned,
    RecordsLoaded,
    OperationsSubmitted,
    RecordsSkipped,
    BatchesCompleted,
}

#[derive(Debug)]
enum Message {
    Delta {
        record_type: RecordType,
        counter: Counter,
        delta: u64,
    },
    Close,
}

/// Cheap, cloneable sender of progress deltas.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<Message>,
}

impl ProgressReporter {
    fn send(&self, record_type: &RecordType, counter: Counter, delta: u64) {
        // A closed channel only means the run has already finished
        let _ = self.tx.send(Message::Delta {
            record_type: record_type.clone(),
            counter,
            delta,
        });
    }

    pub fn total_estimated(&self, record_type: &RecordType, total: u64) {
        self.send(record_type, Counter::TotalEstimate, total);
    }

    pub fn ids_scanned(&self, record_type: &RecordType, n: u64) {
        if n > 0 {
            self.send(record_type, Counter::IdsScanned, n);
        }
    }

    pub fn records_loaded(&self, record_type: &RecordType, n: u64) {
        if n > 0 {
            self.send(record_type, Counter::RecordsLoaded, n);
        }
    }

    pub fn operations_submitted(&self, record_type: &RecordType, n: u64) {
        if n > 0 {
            self.send(record_type, Counter::OperationsSubmitted, n);
        }
    }

    pub fn records_skipped(&self, record_type: &RecordType, n: u64) {
        if n > 0 {
            self.send(record_type, Counter::RecordsSkipped, n);
        }
    }

    pub fn batch_completed(&self, record_type: &RecordType) {
        self.send(record_type, Counter::BatchesCompleted, 1);
    }
}

/// Owns the per-type progress map and the task that updates it.
pub struct ProgressMonitor {
    state: Arc<RwLock<ProgressSnapshot>>,
    reporter: ProgressReporter,
    task: JoinHandle<()>,
}

impl ProgressMonitor {
    /// Spawn the monitor task on the current runtime.
    pub fn spawn(record_types: &[RecordType], listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        let snapshot = ProgressSnapshot {
            per_type: record_types
                .iter()
                .map(|t| (t.clone(), TypeProgress::default()))
                .collect(),
        };
        let state = Arc::new(RwLock::new(snapshot));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(monitor_loop(rx, state.clone(), listeners));

        Self {
            state,
            reporter: ProgressReporter { tx },
            task,
        }
    }

    pub fn reporter(&self) -> ProgressReporter {
        self.reporter.clone()
    }

    /// Shared view used by `ReindexHandle::progress`.
    pub fn view(&self) -> ProgressView {
        ProgressView {
            state: self.state.clone(),
        }
    }

    /// Apply every queued delta, notify `on_finished` and stop the task.
    pub async fn close(self) -> ProgressSnapshot {
        let _ = self.reporter.tx.send(Message::Close);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Progress monitor task failed");
        }
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Read-only access to the progress map.
#[derive(Clone)]
pub struct ProgressView {
    state: Arc<RwLock<ProgressSnapshot>>,
}

impl ProgressView {
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

async fn monitor_loop(
    mut rx: mpsc::UnboundedReceiver<Message>,
    state: Arc<RwLock<ProgressSnapshot>>,
    listeners: Vec<Arc<dyn ProgressListener>>,
) {
    while let Some(Message::Delta {
        record_type,
        counter,
        delta,
    }) = rx.recv().await
    {
        let progress = {
            let mut snapshot = state.write().unwrap_or_else(|e| e.into_inner());
            let entry = snapshot.per_type.entry(record_type.clone()).or_default();
            match counter {
                Counter::TotalEstimate => entry.total_estimate = delta,
                Counter::IdsScanned => entry.ids_scanned += delta,
                Counter::RecordsLoaded => entry.records_loaded += delta,
                Counter::OperationsSubmitted => entry.operations_submitted += delta,
                Counter::RecordsSkipped => entry.records_skipped += delta,
                Counter::BatchesCompleted => entry.batches_completed += delta,
            }
            entry.clone()
        };

        for listener in &listeners {
            match counter {
                Counter::TotalEstimate => listener.on_total_estimated(&record_type, delta),
                Counter::IdsScanned => listener.on_ids_scanned(&record_type, delta, &progress),
                Counter::RecordsLoaded => {
                    listener.on_records_loaded(&record_type, delta, &progress)
                }
                Counter::OperationsSubmitted => {
                    listener.on_operations_submitted(&record_type, delta, &progress)
                }
                Counter::RecordsSkipped | Counter::BatchesCompleted => {}
            }
        }
    }

    let snapshot = state.read().unwrap_or_else(|e| e.into_inner()).clone();
    debug!(types = snapshot.per_type.len(), "Progress monitor closed");
    for listener in &listeners {
        listener.on_finished(&snapshot);
    }
}
