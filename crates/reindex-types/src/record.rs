//! Record types, identifiers and stored records.
//!
//! A record type names one family of records (one column family in the
//! store, one `doc_type` value in the index). Identifiers sort by their
//! byte representation, which is the order the store pages them in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReindexTypesError;

/// Name of a family of records, e.g. `"book"` or `"author"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    /// Create a record type without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Create a record type, rejecting names that cannot be used as a
    /// column family or index term.
    pub fn parse(name: &str) -> Result<Self, ReindexTypesError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ReindexTypesError::InvalidInput(
                "record type must not be empty".to_string(),
            ));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(ReindexTypesError::InvalidInput(format!(
                "record type contains whitespace or comma: {:?}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordType {
    type Err = ReindexTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&str> for RecordType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a record within its type. Ordered lexicographically by bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Decode an identifier from a store key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReindexTypesError> {
        std::str::from_utf8(bytes)
            .map(|s| Self(s.to_string()))
            .map_err(|e| ReindexTypesError::InvalidInput(format!("record id is not UTF-8: {}", e)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A record as held by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: RecordType,
    pub id: RecordId,
    /// Arbitrary record content
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(
        record_type: RecordType,
        id: impl Into<RecordId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            record_type,
            id: id.into(),
            payload,
        }
    }

    /// Serialize to JSON bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReindexTypesError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReindexTypesError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
