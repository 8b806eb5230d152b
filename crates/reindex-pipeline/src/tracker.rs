//! Per-type completion tracking.
//!
//! A tracker counts batches handed off by its scanner and not yet
//! completed by the processing pool. It becomes quiescent once the
//! scanner has finished and nothing is outstanding, or as soon as it is
//! disabled by a shutdown.

use tokio::sync::watch;

use reindex_types::RecordType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerState {
    pub outstanding: usize,
    pub scanning_finished: bool,
    pub disabled: bool,
}

impl TrackerState {
    pub fn is_quiescent(&self) -> bool {
        self.disabled || (self.scanning_finished && self.outstanding == 0)
    }
}

/// Outstanding-work counter for one record type.
pub struct CompletionTracker {
    record_type: RecordType,
    state: watch::Sender<TrackerState>,
}

impl CompletionTracker {
    pub fn new(record_type: RecordType) -> Self {
        let (state, _) = watch::channel(TrackerState::default());
        Self { record_type, state }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Count `n` more batches as handed off.
    pub fn register(&self, n: usize) {
        if n > 0 {
            self.state.send_modify(|s| s.outstanding += n);
        }
    }

    /// Count `n` batches as done.
    pub fn complete(&self, n: usize) {
        self.state.send_if_modified(|s| {
            if n == 0 || s.outstanding == 0 {
                return false;
            }
            s.outstanding = s.outstanding.saturating_sub(n);
            true
        });
    }

    /// The scanner will register no more batches.
    pub fn finish_scanning(&self) {
        self.state.send_if_modified(|s| {
            if s.scanning_finished {
                return false;
            }
            s.scanning_finished = true;
            true
        });
    }

    /// Force quiescence. Idempotent.
    pub fn disable(&self) {
        self.state.send_if_modified(|s| {
            if s.disabled {
                return false;
            }
            s.disabled = true;
            true
        });
    }

    pub fn state(&self) -> TrackerState {
        *self.state.borrow()
    }

    pub fn is_quiescent(&self) -> bool {
        self.state.borrow().is_quiescent()
    }

    /// Resolve once the tracker is quiescent.
    pub async fn wait_quiescent(&self) {
        let mut changes = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = changes.wait_for(TrackerState::is_quiescent).await;
    }
}
