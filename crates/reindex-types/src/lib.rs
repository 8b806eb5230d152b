//! # reindex-types
//!
//! Shared domain types for the reindex workspace.
//!
//! This crate defines the data structures passed between the record store,
//! the batch-indexing pipeline and the search index:
//! - Record types and identifiers: names and ordered keys of stored records
//! - Records: a typed identifier plus an arbitrary JSON payload
//! - Write operations: what the pipeline submits to an index sink
//! - Settings: layered configuration for the `reindex` binary
//!
//! ## Usage
//!
//! ```rust
//! use reindex_types::{Record, RecordType};
//!
//! let record = Record::new(RecordType::new("book"), "0001", serde_json::json!({"title": "Dune"}));
//! assert_eq!(record.id.as_str(), "0001");
//! ```

pub mod config;
pub mod error;
pub mod operation;
pub mod record;

pub use config::{PipelineSettings, Settings};
pub use error::ReindexTypesError;
pub use operation::{index_key, WriteOperation};
pub use record::{Record, RecordId, RecordType};
