//! First-failure latch and cooperative shutdown.
//!
//! Every task of a run shares one latch. The first recorded error is kept
//! and later returned by `ReindexHandle::wait`; later errors are logged
//! and dropped. Recording an error triggers the same shutdown as an
//! explicit cancel: the run token fires, the gate is disabled and every
//! completion tracker is forced quiescent.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ReindexError;
use crate::gate::BackpressureGate;
use crate::tracker::CompletionTracker;

pub struct FailureLatch {
    token: CancellationToken,
    gate: Arc<BackpressureGate>,
    trackers: Vec<Arc<CompletionTracker>>,
    first: Mutex<Option<ReindexError>>,
}

impl FailureLatch {
    pub fn new(
        token: CancellationToken,
        gate: Arc<BackpressureGate>,
        trackers: Vec<Arc<CompletionTracker>>,
    ) -> Self {
        Self {
            token,
            gate,
            trackers,
            first: Mutex::new(None),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the run: fire the token, disable the gate and all trackers.
    pub fn trigger_shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutting down mass indexing run");
        }
        self.token.cancel();
        self.gate.disable();
        for tracker in &self.trackers {
            tracker.disable();
        }
    }

    /// Keep `err` if it is the first failure, then shut the run down.
    pub fn record(&self, err: ReindexError) {
        {
            let mut first = self.first.lock().unwrap_or_else(|e| e.into_inner());
            if first.is_none() {
                error!(error = %err, "Mass indexing failed");
                *first = Some(err);
            } else {
                debug!(error = %err, "Discarding failure after the first");
            }
        }
        self.trigger_shutdown();
    }

    pub fn has_failed(&self) -> bool {
        self.first
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Take the first failure, leaving the latch empty.
    pub fn take(&self) -> Option<ReindexError> {
        self.first
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Admission;
    use reindex_types::RecordType;

    fn latch() -> (FailureLatch, Arc<BackpressureGate>, Arc<CompletionTracker>) {
        let gate = Arc::new(BackpressureGate::new(1));
        let tracker = Arc::new(CompletionTracker::new(RecordType::new("book")));
        let latch =
            FailureLatch::new(CancellationToken::new(), gate.clone(), vec![tracker.clone()]);
        (latch, gate, tracker)
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let (latch, _, _) = latch();
        latch.record(ReindexError::Source("first".to_string()));
        latch.record(ReindexError::Sink("second".to_string()));

        assert!(latch.has_failed());
        match latch.take() {
            Some(ReindexError::Source(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(latch.take().is_none());
    }

    #[tokio::test]
    async fn test_record_triggers_shutdown() {
        let (latch, gate, tracker) = latch();
        tracker.register(3);
        latch.record(ReindexError::Sink("boom".to_string()));

        assert!(latch.is_cancelled());
        assert!(gate.is_disabled());
        assert!(tracker.is_quiescent());
        assert_eq!(
            gate.acquire(1, &CancellationToken::new()).await,
            Admission::Disabled
        );
    }

    #[test]
    fn test_shutdown_without_failure() {
        let (latch, gate, _) = latch();
        latch.trigger_shutdown();
        assert!(latch.is_cancelled());
        assert!(gate.is_disabled());
        assert!(!latch.has_failed());
    }
}
