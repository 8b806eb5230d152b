//! End-of-run coordination.
//!
//! The coordinator is the last phase of every run, whether it completed,
//! was cancelled or failed. It waits for the trackers, joins the scanners,
//! drains the processing pool and then optimizes, flushes and releases
//! resources before signalling the handle.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use reindex_types::RecordType;

use crate::error::ReindexError;
use crate::failure::FailureLatch;
use crate::orchestrator::{RunOutcome, RunSummary};
use crate::processor::BatchPool;
use crate::progress::ProgressMonitor;
use crate::scanner::ScanStats;
use crate::sink::IndexSink;
use crate::source::RecordSource;
use crate::task::{join_error, run_blocking};
use crate::tracker::CompletionTracker;

pub(crate) struct CleanupCoordinator {
    pub record_types: Vec<RecordType>,
    pub trackers: Vec<Arc<CompletionTracker>>,
    pub pool: Arc<BatchPool>,
    pub source: Arc<dyn RecordSource>,
    pub sink: Arc<dyn IndexSink>,
    pub latch: Arc<FailureLatch>,
    pub monitor: ProgressMonitor,
    pub optimize_on_finish: bool,
    pub done: watch::Sender<bool>,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
}

impl CleanupCoordinator {
    pub async fn finish(
        self,
        mut scanners: JoinSet<ScanStats>,
    ) -> Result<RunSummary, ReindexError> {
        let token = self.latch.token().clone();

        tokio::select! {
            _ = join_all(self.trackers.iter().map(|t| t.wait_quiescent())) => {
                debug!("All record types quiescent");
            }
            _ = token.cancelled() => {
                debug!("Run cancelled before quiescence");
            }
        }

        while let Some(joined) = scanners.join_next().await {
            if let Err(e) = joined {
                self.latch.record(join_error(e));
            }
        }
        self.pool.drain().await;

        if !self.latch.is_cancelled() && self.optimize_on_finish {
            self.optimize_all().await;
        }

        // Flush regardless of outcome so completed work is kept
        let sink = self.sink.clone();
        let types = self.record_types.clone();
        if let Err(e) = run_blocking(move || sink.flush(&types)).await {
            self.latch.record(e);
        }

        let source = self.source.clone();
        if let Err(e) = run_blocking(move || source.release_resources()).await {
            warn!(error = %e, "Failed to release record source resources");
        }

        let progress = self.monitor.close().await;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let cancelled = self.latch.is_cancelled();
        self.done.send_replace(true);

        if let Some(err) = self.latch.take() {
            return Err(err);
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        let totals = progress.totals();
        info!(
            outcome = ?outcome,
            elapsed_ms,
            ids_scanned = totals.ids_scanned,
            operations_submitted = totals.operations_submitted,
            records_skipped = totals.records_skipped,
            "Mass indexing finished"
        );

        Ok(RunSummary {
            outcome,
            started_at: self.started_at,
            elapsed_ms,
            progress,
        })
    }

    async fn optimize_all(&self) {
        for record_type in &self.record_types {
            let sink = self.sink.clone();
            let ty = record_type.clone();
            match run_blocking(move || sink.optimize(&ty)).await {
                Ok(()) => debug!(record_type = %record_type, "Optimized"),
                Err(e) => {
                    self.latch.record(e);
                    return;
                }
            }
        }
    }
}
