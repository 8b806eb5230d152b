//! Column family naming.
//!
//! Every record type owns a column family named `records.<type>`. The
//! prefix keeps record types from colliding with RocksDB's `default`
//! column family.

use rocksdb::Options;

use reindex_types::RecordType;

/// Prefix of every record column family
pub const RECORD_CF_PREFIX: &str = "records.";

/// Column family name for a record type
pub fn cf_name(record_type: &RecordType) -> String {
    format!("{}{}", RECORD_CF_PREFIX, record_type)
}

/// Record type stored in a column family, `None` for non-record families
pub fn record_type_of(cf_name: &str) -> Option<RecordType> {
    cf_name
        .strip_prefix(RECORD_CF_PREFIX)
        .filter(|name| !name.is_empty())
        .map(RecordType::new)
}

/// Options for record column families
pub fn record_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cf_name_round_trip() {
        let ty = RecordType::new("book");
        assert_eq!(cf_name(&ty), "records.book");
        assert_eq!(record_type_of("records.book"), Some(ty));
    }

    #[test]
    fn test_non_record_families_ignored() {
        assert_eq!(record_type_of("default"), None);
        assert_eq!(record_type_of("records."), None);
    }
}
