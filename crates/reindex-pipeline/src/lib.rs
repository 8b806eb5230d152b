//! Batch mass-indexing pipeline.
//!
//! Rebuilds a search index from the primary record store by scanning the
//! identifiers of every configured record type, loading the records in
//! batches and submitting one write operation per record to an index sink.
//!
//! ## Key Components
//!
//! - [`MassIndexer`]: Validates configuration and starts a run
//! - [`ReindexHandle`]: Waits for, times out on or cancels a run
//! - [`BackpressureGate`]: Bounds batches handed off but not yet completed
//! - [`RecordScanner`]: Pages identifiers of one type into batches
//! - [`BatchProcessor`] / [`BatchPool`]: Load, map and submit batches
//! - [`CompletionTracker`]: Detects when a type has been fully processed
//! - [`FailureLatch`]: Keeps the first error and shuts the run down
//! - [`ProgressMonitor`]: Aggregates progress and notifies listeners
//!
//! ## Collaborators
//!
//! A run talks to the outside world through three traits:
//! [`RecordSource`] (the store), [`DocumentMapper`] (record to write
//! operation) and [`IndexSink`] (the index). [`StorageRecordSource`],
//! [`JsonDocumentMapper`] and [`TantivyIndexSink`] connect them to RocksDB
//! and Tantivy; [`memory`] provides in-memory versions for tests.
//!
//! ## Example
//!
//! ```ignore
//! use reindex_pipeline::{MassIndexer, ReindexConfig, RunOutcome};
//!
//! let config = ReindexConfig::for_types(["book", "author"]).with_threads_to_process(4);
//! let indexer = MassIndexer::new(config, source, mapper, sink);
//! let handle = indexer.start()?;
//!
//! let summary = handle.wait().await?;
//! assert_eq!(summary.outcome, RunOutcome::Completed);
//! ```

mod cleanup;
pub mod config;
pub mod error;
pub mod failure;
pub mod gate;
pub mod json_mapper;
pub mod mapper;
pub mod memory;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod scanner;
pub mod sink;
pub mod source;
pub mod storage_source;
pub mod tantivy_sink;
mod task;
pub mod tracker;

pub use config::{ReindexConfig, DEFAULT_GATE_CAPACITY_PER_PROCESSING_THREAD};
pub use error::ReindexError;
pub use failure::FailureLatch;
pub use gate::{Admission, BackpressureGate, GateState};
pub use json_mapper::{JsonDocumentMapper, RecordFilter};
pub use mapper::DocumentMapper;
pub use orchestrator::{MassIndexer, MassIndexerBuilder, ReindexHandle, RunOutcome, RunSummary};
pub use processor::{BatchPool, BatchProcessor, BatchStats, IdentifierBatch};
pub use progress::{
    LoggingProgressListener, NoOpProgressListener, ProgressListener, ProgressMonitor,
    ProgressReporter, ProgressSnapshot, ProgressView, TypeProgress,
};
pub use scanner::{RecordScanner, ScanContext, ScanStats};
pub use sink::{IndexSink, PartialSubmit};
pub use source::RecordSource;
pub use storage_source::StorageRecordSource;
pub use tantivy_sink::TantivyIndexSink;
pub use tracker::{CompletionTracker, TrackerState};
