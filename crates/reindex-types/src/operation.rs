//! Index write operations.

use serde::{Deserialize, Serialize};

use crate::record::{RecordId, RecordType};

/// A single "add or update" instruction for the search index.
///
/// The `(record_type, doc_id)` pair identifies the document; submitting the
/// same pair twice replaces the earlier document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    pub record_type: RecordType,
    pub doc_id: RecordId,
    /// Searchable text
    pub text: String,
    /// Stored JSON payload, returned verbatim on retrieval
    pub payload: String,
}

impl WriteOperation {
    pub fn new(
        record_type: RecordType,
        doc_id: RecordId,
        text: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            record_type,
            doc_id,
            text: text.into(),
            payload: payload.into(),
        }
    }

    /// Key unique across all record types, used by the index as primary key.
    pub fn index_key(&self) -> String {
        index_key(&self.record_type, &self.doc_id)
    }
}

/// Build the index primary key for a record.
pub fn index_key(record_type: &RecordType, doc_id: &RecordId) -> String {
    format!("{}:{}", record_type, doc_id)
}
