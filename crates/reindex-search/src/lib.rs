//! # reindex-search
//!
//! Full-text index written by the mass reindexing pipeline, built on Tantivy.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence
//! - Type-agnostic schema: document type, document id, searchable text,
//!   stored JSON payload
//! - Upsert by `(type, id)`, purge of a whole type, segment merging
//! - Document counts and id listings for verification

pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;

pub use document::operation_to_doc;
pub use error::SearchError;
pub use index::{open_or_create_index, SearchIndex, SearchIndexConfig};
pub use indexer::SearchIndexer;
pub use schema::{build_reindex_schema, SearchSchema};
