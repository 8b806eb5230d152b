//! Record store for the reindex workspace.
//!
//! Provides RocksDB-backed storage with:
//! - One column family per record type, created on first write
//! - Records keyed by id, iterated in ascending byte order
//! - Keyset paging of identifiers with a bounded read time
//! - Atomic multi-record writes via WriteBatch

pub mod column_families;
pub mod db;
pub mod error;

pub use db::{RecordStore, StoreStats};
pub use error::StorageError;
