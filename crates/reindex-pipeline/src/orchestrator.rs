//! Mass indexer entry point and run lifecycle.
//!
//! [`MassIndexer::start`] validates the configuration, wires the gate,
//! trackers, failure latch, progress monitor and processing pool together
//! and spawns the run on the current tokio runtime. The run purges, counts,
//! arms the gate, starts one scanner per record type and finally hands
//! over to the cleanup coordinator. The returned [`ReindexHandle`] waits
//! for or cancels the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reindex_types::RecordType;

use crate::cleanup::CleanupCoordinator;
use crate::config::ReindexConfig;
use crate::error::ReindexError;
use crate::failure::FailureLatch;
use crate::gate::BackpressureGate;
use crate::mapper::DocumentMapper;
use crate::processor::{BatchPool, BatchProcessor};
use crate::progress::{ProgressListener, ProgressMonitor, ProgressSnapshot, ProgressView};
use crate::scanner::{RecordScanner, ScanContext, ScanStats};
use crate::sink::IndexSink;
use crate::source::RecordSource;
use crate::task::{join_error, run_blocking};
use crate::tracker::CompletionTracker;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub progress: ProgressSnapshot,
}

/// Reindexes every record of the configured types into an index sink.
///
/// A mass indexer runs once; build a new one for another run.
pub struct MassIndexer {
    config: ReindexConfig,
    source: Arc<dyn RecordSource>,
    mapper: Arc<dyn DocumentMapper>,
    sink: Arc<dyn IndexSink>,
    listeners: Vec<Arc<dyn ProgressListener>>,
    started: AtomicBool,
}

impl MassIndexer {
    pub fn new(
        config: ReindexConfig,
        source: Arc<dyn RecordSource>,
        mapper: Arc<dyn DocumentMapper>,
        sink: Arc<dyn IndexSink>,
    ) -> Self {
        Self {
            config,
            source,
            mapper,
            sink,
            listeners: Vec::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn builder(
        source: Arc<dyn RecordSource>,
        mapper: Arc<dyn DocumentMapper>,
        sink: Arc<dyn IndexSink>,
    ) -> MassIndexerBuilder {
        MassIndexerBuilder {
            config: ReindexConfig::default(),
            source,
            mapper,
            sink,
            listeners: Vec::new(),
        }
    }

    /// Register a progress listener. Has no effect once started.
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn config(&self) -> &ReindexConfig {
        &self.config
    }

    /// Validate the configuration and spawn the run.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// `AlreadyStarted` on every call after the first successful one.
    pub fn start(&self) -> Result<ReindexHandle, ReindexError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            ReindexError::Runtime(format!("mass indexing needs a tokio runtime: {}", e))
        })?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ReindexError::AlreadyStarted);
        }

        let config = self.config.clone();
        let token = CancellationToken::new();
        let gate = Arc::new(BackpressureGate::new(config.effective_gate_capacity()));
        let trackers: Vec<Arc<CompletionTracker>> = config
            .record_types
            .iter()
            .map(|t| Arc::new(CompletionTracker::new(t.clone())))
            .collect();
        let producing: Vec<Arc<AtomicBool>> = config
            .record_types
            .iter()
            .map(|_| Arc::new(AtomicBool::new(true)))
            .collect();
        let latch = Arc::new(FailureLatch::new(token.clone(), gate.clone(), trackers.clone()));

        let monitor = ProgressMonitor::spawn(&config.record_types, self.listeners.clone());
        let processor = Arc::new(BatchProcessor::new(
            self.source.clone(),
            self.mapper.clone(),
            self.sink.clone(),
            config.records_per_sub_batch,
            monitor.reporter(),
            token,
        ));
        let pool = Arc::new(BatchPool::new(
            processor,
            config.threads_to_process,
            gate.clone(),
            latch.clone(),
            monitor.reporter(),
        ));
        let (done_tx, done_rx) = watch::channel(false);
        let progress = monitor.view();

        let run = Run {
            config,
            source: self.source.clone(),
            sink: self.sink.clone(),
            gate: gate.clone(),
            trackers,
            producing: producing.clone(),
            latch: latch.clone(),
            pool,
            monitor,
            done: done_tx,
            started_at: Utc::now(),
            started: Instant::now(),
        };
        let task = runtime.spawn(run.execute());

        Ok(ReindexHandle {
            task,
            done: done_rx,
            latch,
            producing,
            progress,
            gate,
        })
    }
}

/// Builder for [`MassIndexer`].
pub struct MassIndexerBuilder {
    config: ReindexConfig,
    source: Arc<dyn RecordSource>,
    mapper: Arc<dyn DocumentMapper>,
    sink: Arc<dyn IndexSink>,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl MassIndexerBuilder {
    pub fn config(mut self, config: ReindexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn record_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        self.config.record_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> MassIndexer {
        MassIndexer {
            config: self.config,
            source: self.source,
            mapper: self.mapper,
            sink: self.sink,
            listeners: self.listeners,
            started: AtomicBool::new(false),
        }
    }
}

/// Everything a spawned run owns.
struct Run {
    config: ReindexConfig,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn IndexSink>,
    gate: Arc<BackpressureGate>,
    trackers: Vec<Arc<CompletionTracker>>,
    producing: Vec<Arc<AtomicBool>>,
    latch: Arc<FailureLatch>,
    pool: Arc<BatchPool>,
    monitor: ProgressMonitor,
    done: watch::Sender<bool>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Run {
    async fn execute(self) -> Result<RunSummary, ReindexError> {
        info!(
            record_types = ?self.config.record_types,
            ids_per_batch = self.config.ids_per_batch,
            threads_to_scan = self.config.threads_to_scan,
            threads_to_process = self.config.threads_to_process,
            gate_capacity = self.config.effective_gate_capacity(),
            "Mass indexing started"
        );

        if self.config.purge_on_start {
            self.purge().await;
        }
        if !self.latch.is_cancelled() {
            self.estimate_totals().await;
        }

        self.gate.mark_ready();
        let scanners = self.spawn_scanners();

        CleanupCoordinator {
            record_types: self.config.record_types,
            trackers: self.trackers,
            pool: self.pool,
            source: self.source,
            sink: self.sink,
            latch: self.latch,
            monitor: self.monitor,
            optimize_on_finish: self.config.optimize_on_finish,
            done: self.done,
            started_at: self.started_at,
            started: self.started,
        }
        .finish(scanners)
        .await
    }

    async fn purge(&self) {
        for record_type in &self.config.record_types {
            if self.latch.is_cancelled() {
                return;
            }

            let sink = self.sink.clone();
            let ty = record_type.clone();
            let optimize = self.config.optimize_after_purge;
            let purged = run_blocking(move || {
                sink.purge_all(&ty)?;
                if optimize {
                    sink.optimize(&ty)?;
                }
                Ok(())
            })
            .await;

            match purged {
                Ok(()) => info!(record_type = %record_type, "Purged index"),
                Err(e) => {
                    self.latch.record(e);
                    return;
                }
            }
        }
    }

    /// Advisory counts for progress totals. Failures only lose the estimate.
    async fn estimate_totals(&self) {
        let reporter = self.monitor.reporter();
        for record_type in &self.config.record_types {
            let source = self.source.clone();
            let ty = record_type.clone();
            match run_blocking(move || source.count_records(&ty)).await {
                Ok(total) => {
                    debug!(record_type = %record_type, total, "Estimated record count");
                    reporter.total_estimated(record_type, total);
                }
                Err(e) => {
                    warn!(record_type = %record_type, error = %e, "Could not estimate record count")
                }
            }
        }
    }

    /// One scanner per type, at most `threads_to_scan` running at once.
    fn spawn_scanners(&self) -> JoinSet<ScanStats> {
        let ctx = Arc::new(ScanContext {
            source: self.source.clone(),
            gate: self.gate.clone(),
            pool: self.pool.clone(),
            latch: self.latch.clone(),
            progress: self.monitor.reporter(),
            ids_per_batch: self.config.ids_per_batch,
            transaction_timeout: self.config.transaction_timeout,
        });
        let permits = Arc::new(Semaphore::new(self.config.threads_to_scan));
        let mut scanners = JoinSet::new();

        for (tracker, producing) in self.trackers.iter().zip(&self.producing) {
            let scanner = RecordScanner::new(tracker.clone(), producing.clone(), ctx.clone());
            let permits = permits.clone();
            let token = self.latch.token().clone();

            scanners.spawn(async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return ScanStats::default(),
                    },
                    _ = token.cancelled() => return ScanStats::default(),
                };
                scanner.run().await
            });
        }
        scanners
    }
}

/// Handle to a running mass indexing run.
pub struct ReindexHandle {
    task: JoinHandle<Result<RunSummary, ReindexError>>,
    done: watch::Receiver<bool>,
    latch: Arc<FailureLatch>,
    producing: Vec<Arc<AtomicBool>>,
    progress: ProgressView,
    gate: Arc<BackpressureGate>,
}

impl ReindexHandle {
    /// Wait for the run to end.
    ///
    /// Returns the first failure of the run, or a summary whose outcome
    /// tells whether the run completed or was cancelled.
    pub async fn wait(self) -> Result<RunSummary, ReindexError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(join_error(e)),
        }
    }

    /// Resolves once the run has ended, without consuming the handle.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the run task is gone as well
        let _ = done.wait_for(|done| *done).await;
    }

    /// Whether the run ended within `timeout`. Never cancels the run.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.finished()).await.is_ok()
    }

    /// Cancel the run and wait for in-flight work to drain.
    ///
    /// Returns whether any scanner was still producing batches. Cancelling
    /// a finished run does nothing and returns `false`.
    pub async fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }

        let producing = self.producing.iter().any(|p| p.load(Ordering::SeqCst));
        self.latch.trigger_shutdown();
        self.finished().await;
        producing
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Batches handed to the pool but not yet completed.
    pub fn in_flight_batches(&self) -> usize {
        self.gate.occupancy()
    }
}
