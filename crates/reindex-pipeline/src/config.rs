//! Configuration for a mass indexing run.

use std::collections::HashSet;
use std::time::Duration;

use reindex_types::{PipelineSettings, RecordType};

use crate::error::ReindexError;

/// Default backpressure capacity, in batches, per processing thread.
///
/// With the default of 6 processing threads the gate admits 24 batches
/// that have been handed off but not yet completed.
pub const DEFAULT_GATE_CAPACITY_PER_PROCESSING_THREAD: usize = 4;

/// Configuration for a mass indexing run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexConfig {
    /// Record types to reindex, one scanner each.
    pub record_types: Vec<RecordType>,
    /// Maximum identifiers per page and per batch.
    pub ids_per_batch: usize,
    /// Records loaded and submitted together within a batch.
    pub records_per_sub_batch: usize,
    /// Scanners allowed to run at the same time.
    pub threads_to_scan: usize,
    /// Batches processed at the same time.
    pub threads_to_process: usize,
    /// Delete every document of the configured types before scanning.
    pub purge_on_start: bool,
    /// Optimize each purged type before scanning.
    pub optimize_after_purge: bool,
    /// Optimize each type after a run that was not cancelled.
    pub optimize_on_finish: bool,
    /// Upper bound for a single identifier page read.
    pub transaction_timeout: Option<Duration>,
    /// Overrides the default gate capacity.
    pub gate_capacity: Option<usize>,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            record_types: Vec::new(),
            ids_per_batch: 100,
            records_per_sub_batch: 10,
            threads_to_scan: 1,
            threads_to_process: 6,
            purge_on_start: true,
            optimize_after_purge: true,
            optimize_on_finish: true,
            transaction_timeout: None,
            gate_capacity: None,
        }
    }
}

impl ReindexConfig {
    /// Create a config for the given record types with default tuning.
    pub fn for_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        Self {
            record_types: types.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Build a config from loaded settings.
    pub fn from_settings(settings: &PipelineSettings, record_types: Vec<RecordType>) -> Self {
        Self {
            record_types,
            ids_per_batch: settings.ids_per_batch,
            records_per_sub_batch: settings.records_per_sub_batch,
            threads_to_scan: settings.threads_to_scan,
            threads_to_process: settings.threads_to_process,
            purge_on_start: settings.purge_on_start,
            optimize_after_purge: settings.optimize_after_purge,
            optimize_on_finish: settings.optimize_on_finish,
            transaction_timeout: settings.transaction_timeout_secs.map(Duration::from_secs),
            gate_capacity: settings.gate_capacity,
        }
    }

    pub fn with_ids_per_batch(mut self, n: usize) -> Self {
        self.ids_per_batch = n;
        self
    }

    pub fn with_records_per_sub_batch(mut self, n: usize) -> Self {
        self.records_per_sub_batch = n;
        self
    }

    pub fn with_threads_to_scan(mut self, n: usize) -> Self {
        self.threads_to_scan = n;
        self
    }

    pub fn with_threads_to_process(mut self, n: usize) -> Self {
        self.threads_to_process = n;
        self
    }

    pub fn with_purge_on_start(mut self, purge: bool) -> Self {
        self.purge_on_start = purge;
        self
    }

    pub fn with_optimize_after_purge(mut self, optimize: bool) -> Self {
        self.optimize_after_purge = optimize;
        self
    }

    pub fn with_optimize_on_finish(mut self, optimize: bool) -> Self {
        self.optimize_on_finish = optimize;
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = Some(timeout);
        self
    }

    pub fn with_gate_capacity(mut self, capacity: usize) -> Self {
        self.gate_capacity = Some(capacity);
        self
    }

    /// Gate capacity in batches: the override, or
    /// `threads_to_process * DEFAULT_GATE_CAPACITY_PER_PROCESSING_THREAD`.
    pub fn effective_gate_capacity(&self) -> usize {
        self.gate_capacity.unwrap_or_else(|| {
            self.threads_to_process
                .saturating_mul(DEFAULT_GATE_CAPACITY_PER_PROCESSING_THREAD)
        })
    }

    /// Check every numeric knob is at least one and the type list is usable.
    pub fn validate(&self) -> Result<(), ReindexError> {
        let positive = [
            ("ids_per_batch", self.ids_per_batch),
            ("records_per_sub_batch", self.records_per_sub_batch),
            ("threads_to_scan", self.threads_to_scan),
            ("threads_to_process", self.threads_to_process),
            ("gate_capacity", self.effective_gate_capacity()),
        ];
        for (name, value) in positive {
            if value < 1 {
                return Err(ReindexError::Config(format!(
                    "{} must be >= 1, got {}",
                    name, value
                )));
            }
        }

        if self.record_types.is_empty() {
            return Err(ReindexError::Config(
                "at least one record type is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for record_type in &self.record_types {
            if record_type.as_str().is_empty() {
                return Err(ReindexError::Config(
                    "record type must not be empty".to_string(),
                ));
            }
            if !seen.insert(record_type) {
                return Err(ReindexError::Config(format!(
                    "record type listed twice: {}",
                    record_type
                )));
            }
        }

        if let Some(timeout) = self.transaction_timeout {
            if timeout.is_zero() {
                return Err(ReindexError::Config(
                    "transaction_timeout must be greater than zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}
