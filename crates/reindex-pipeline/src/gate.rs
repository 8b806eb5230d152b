//! Backpressure gate between scanners and the processing pool.
//!
//! The gate bounds how many batches have been handed to the processing
//! pool but not yet completed. Scanners `acquire` before every handoff and
//! the processing side `release`s when a batch is done, successful or not.
//!
//! Before `mark_ready` the gate admits unconditionally but still counts
//! occupancy. After `disable` every current and future `acquire` returns
//! immediately with [`Admission::Disabled`].

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateState {
    /// Units admitted and not yet released
    pub occupancy: usize,
    pub capacity: usize,
    /// Whether the capacity bound is enforced
    pub armed: bool,
    /// Terminal: nothing blocks any more
    pub disabled: bool,
}

/// Outcome of [`BackpressureGate::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Units were added to the occupancy; the caller must release them.
    Admitted,
    /// The gate is disabled; nothing was added.
    Disabled,
    /// The caller's token fired while waiting; nothing was added.
    Cancelled,
}

/// Counting gate with a permanent disabled state.
pub struct BackpressureGate {
    state: watch::Sender<GateState>,
}

impl BackpressureGate {
    /// Create an unarmed gate.
    pub fn new(capacity: usize) -> Self {
        let (state, _) = watch::channel(GateState {
            occupancy: 0,
            capacity,
            armed: false,
            disabled: false,
        });
        Self { state }
    }

    /// Wait until `n` units fit, the gate is disabled, or `cancel` fires.
    ///
    /// A request larger than the capacity is admitted once occupancy
    /// drops to zero, so it cannot wait forever.
    pub async fn acquire(&self, n: usize, cancel: &CancellationToken) -> Admission {
        let mut changes = self.state.subscribe();

        loop {
            if cancel.is_cancelled() {
                return Admission::Cancelled;
            }

            let mut outcome = None;
            self.state.send_if_modified(|s| {
                if s.disabled {
                    outcome = Some(Admission::Disabled);
                    return false;
                }
                if !s.armed || s.occupancy == 0 || s.occupancy + n <= s.capacity {
                    s.occupancy += n;
                    outcome = Some(Admission::Admitted);
                    return true;
                }
                false
            });
            if let Some(outcome) = outcome {
                return outcome;
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Admission::Disabled;
                    }
                }
                _ = cancel.cancelled() => return Admission::Cancelled,
            }
        }
    }

    /// Return `n` units. Occupancy never goes below zero.
    pub fn release(&self, n: usize) {
        self.state.send_if_modified(|s| {
            if n == 0 || s.occupancy == 0 {
                return false;
            }
            s.occupancy = s.occupancy.saturating_sub(n);
            true
        });
    }

    /// Start enforcing the capacity bound.
    pub fn mark_ready(&self) {
        self.state.send_if_modified(|s| {
            if s.armed {
                return false;
            }
            s.armed = true;
            true
        });
        debug!(capacity = self.state.borrow().capacity, "Backpressure gate armed");
    }

    /// Permanently unblock all current and future waiters. Idempotent.
    pub fn disable(&self) {
        self.state.send_if_modified(|s| {
            if s.disabled {
                return false;
            }
            s.disabled = true;
            true
        });
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn occupancy(&self) -> usize {
        self.state.borrow().occupancy
    }

    pub fn is_disabled(&self) -> bool {
        self.state.borrow().disabled
    }
}
