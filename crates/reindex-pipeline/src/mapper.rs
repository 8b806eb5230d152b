//! Record-to-document mapping.

use reindex_types::{Record, WriteOperation};

use crate::error::ReindexError;

/// Converts a record into an index write operation.
pub trait DocumentMapper: Send + Sync {
    /// `Ok(None)` skips the record without failing the run.
    fn to_write_operation(&self, record: &Record) -> Result<Option<WriteOperation>, ReindexError>;
}

impl<F> DocumentMapper for F
where
    F: Fn(&Record) -> Result<Option<WriteOperation>, ReindexError> + Send + Sync,
{
    fn to_write_operation(&self, record: &Record) -> Result<Option<WriteOperation>, ReindexError> {
        self(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_types::RecordType;
    use serde_json::json;

    #[test]
    fn test_closure_mapper() {
        let mapper = |record: &Record| -> Result<Option<WriteOperation>, ReindexError> {
            if record.id.as_str() == "skip" {
                return Ok(None);
            }
            Ok(Some(WriteOperation::new(
                record.record_type.clone(),
                record.id.clone(),
                "text",
                "{}",
            )))
        };

        let keep = Record::new(RecordType::new("book"), "1", json!({}));
        let skip = Record::new(RecordType::new("book"), "skip", json!({}));
        assert!(mapper.to_write_operation(&keep).unwrap().is_some());
        assert!(mapper.to_write_operation(&skip).unwrap().is_none());
    }
}
