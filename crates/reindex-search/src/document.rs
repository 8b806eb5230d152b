//! Conversion of write operations into Tantivy documents.

use tantivy::doc;
use tantivy::TantivyDocument;

use reindex_types::WriteOperation;

use crate::schema::SearchSchema;

/// Convert a write operation to a Tantivy document.
pub fn operation_to_doc(schema: &SearchSchema, op: &WriteOperation) -> TantivyDocument {
    doc!(
        schema.doc_key => op.index_key(),
        schema.doc_type => op.record_type.to_string(),
        schema.doc_id => op.doc_id.to_string(),
        schema.text => op.text.clone(),
        schema.payload => op.payload.clone()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_reindex_schema;
    use reindex_types::{RecordId, RecordType};
    use tantivy::schema::Value;

    #[test]
    fn test_operation_to_doc() {
        let schema = build_reindex_schema();
        let op = WriteOperation::new(
            RecordType::new("book"),
            RecordId::new("0007"),
            "dune frank herbert",
            r#"{"title":"Dune"}"#,
        );
        let doc = operation_to_doc(&schema, &op);

        assert_eq!(
            doc.get_first(schema.doc_key).and_then(|v| v.as_str()),
            Some("book:0007")
        );
        assert_eq!(
            doc.get_first(schema.doc_type).and_then(|v| v.as_str()),
            Some("book")
        );
        assert_eq!(
            doc.get_first(schema.payload).and_then(|v| v.as_str()),
            Some(r#"{"title":"Dune"}"#)
        );
    }
}
