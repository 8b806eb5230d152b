//! Default [`DocumentMapper`] for JSON payloads.
//!
//! The searchable text is every string, number and boolean leaf of the
//! payload joined by spaces, in document order. The payload itself is
//! stored verbatim. Records with a `null` payload are skipped, as are
//! records rejected by the filter registered for their type.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use reindex_types::{Record, RecordType, WriteOperation};

use crate::error::ReindexError;
use crate::mapper::DocumentMapper;

/// Returns `true` for records that should be indexed.
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[derive(Default, Clone)]
pub struct JsonDocumentMapper {
    /// Top-level keys to take text from; all keys when empty
    text_fields: Vec<String>,
    filters: HashMap<RecordType, RecordFilter>,
}

impl JsonDocumentMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only index text found under these top-level keys.
    pub fn with_text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Skip records of `record_type` for which `filter` returns `false`.
    pub fn with_filter<F>(mut self, record_type: RecordType, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filters.insert(record_type, Arc::new(filter));
        self
    }

    fn text_of(&self, payload: &Value) -> String {
        let mut parts = Vec::new();
        match payload {
            Value::Object(map) if !self.text_fields.is_empty() => {
                for field in &self.text_fields {
                    if let Some(value) = map.get(field) {
                        collect_leaves(value, &mut parts);
                    }
                }
            }
            other => collect_leaves(other, &mut parts),
        }
        parts.join(" ")
    }
}

fn collect_leaves(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            if !s.is_empty() {
                parts.push(s.clone());
            }
        }
        Value::Bool(b) => parts.push(b.to_string()),
        Value::Number(n) => parts.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_leaves(v, parts)),
        Value::Object(map) => map.values().for_each(|v| collect_leaves(v, parts)),
    }
}

impl DocumentMapper for JsonDocumentMapper {
    fn to_write_operation(&self, record: &Record) -> Result<Option<WriteOperation>, ReindexError> {
        if record.payload.is_null() {
            return Ok(None);
        }
        if let Some(filter) = self.filters.get(&record.record_type) {
            if !filter(record) {
                return Ok(None);
            }
        }

        let payload = serde_json::to_string(&record.payload).map_err(|e| ReindexError::Mapping {
            record_type: record.record_type.to_string(),
            id: record.id.to_string(),
            message: e.to_string(),
        })?;

        Ok(Some(WriteOperation::new(
            record.record_type.clone(),
            record.id.clone(),
            self.text_of(&record.payload),
            payload,
        )))
    }
}
