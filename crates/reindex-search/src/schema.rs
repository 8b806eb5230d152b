//! Tantivy schema for reindexed documents.
//!
//! The schema does not know about individual record types. Every document
//! carries its type, its id, one searchable text field and the stored JSON
//! payload produced by the document mapper.

use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

use crate::SearchError;

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct SearchSchema {
    schema: Schema,
    /// Primary key "<type>:<id>" (STRING | STORED)
    pub doc_key: Field,
    /// Record type (STRING | STORED)
    pub doc_type: Field,
    /// Record id within its type (STRING | STORED)
    pub doc_id: Field,
    /// Searchable text (TEXT)
    pub text: Field,
    /// Mapped JSON payload (STORED)
    pub payload: Field,
}

impl SearchSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a SearchSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };

        Ok(Self {
            doc_key: field("doc_key")?,
            doc_type: field("doc_type")?,
            doc_id: field("doc_id")?,
            text: field("text")?,
            payload: field("payload")?,
            schema,
        })
    }
}

/// Build the reindex schema.
pub fn build_reindex_schema() -> SearchSchema {
    let mut schema_builder = Schema::builder();

    let doc_key = schema_builder.add_text_field("doc_key", STRING | STORED);
    let doc_type = schema_builder.add_text_field("doc_type", STRING | STORED);
    let doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);
    let text = schema_builder.add_text_field("text", TEXT);
    let payload = schema_builder.add_text_field("payload", STORED);

    let schema = schema_builder.build();

    SearchSchema {
        schema,
        doc_key,
        doc_type,
        doc_id,
        text,
        payload,
    }
}
