//! Table descriptor decoding
//!
//! A descriptor is a self-describing blob of big-endian words stored in a
//! control file TABLE_DESCRIPTION section:
//!
//! ```text
//! version | table id | schema version | name | attribute count
//! then per attribute: name | kind code | array size | flags
//! ```
//!
//! Strings are a byte-length word followed by the bytes zero-padded to a
//! word. Flag bits: 0 primary key, 1 nullable, 2 variable width.

use crate::format::{padded_len, MAX_ATTRIBUTE_BYTES, TABLE_DESCRIPTOR_VERSION};
use byteorder::{BigEndian, ByteOrder};
use restore_core::{ColumnDef, ElementKind, TableSchema};

pub(crate) const FLAG_PRIMARY_KEY: u32 = 1 << 0;
pub(crate) const FLAG_NULLABLE: u32 = 1 << 1;
pub(crate) const FLAG_VARIABLE: u32 = 1 << 2;
const KNOWN_FLAGS: u32 = FLAG_PRIMARY_KEY | FLAG_NULLABLE | FLAG_VARIABLE;

struct WordCursor<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> WordCursor<'b> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'b [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| format!("descriptor ends inside {}", what))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn word(&mut self, what: &str) -> Result<u32, String> {
        self.take(4, what).map(BigEndian::read_u32)
    }

    fn string(&mut self, what: &str) -> Result<String, String> {
        let len = self.word(what)? as usize;
        let padded = self.take(padded_len(len), what)?;
        String::from_utf8(padded[..len].to_vec()).map_err(|_| format!("{} is not UTF-8", what))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decode a descriptor blob into a table schema.
///
/// Attributes are created in encoded order, so attribute ids and null-bit
/// indexes follow the stream.
pub(crate) fn parse_table_descriptor(bytes: &[u8]) -> Result<TableSchema, String> {
    let mut cursor = WordCursor { bytes, pos: 0 };

    let version = cursor.word("descriptor version")?;
    if version != TABLE_DESCRIPTOR_VERSION {
        return Err(format!(
            "descriptor version {} not supported (expected {})",
            version, TABLE_DESCRIPTOR_VERSION
        ));
    }
    let table_id = cursor.word("table id")?;
    let schema_version = cursor.word("schema version")?;
    let name = cursor.string("table name")?;
    let count = cursor.word("attribute count")?;
    if count == 0 {
        return Err(format!("table '{}' has no attributes", name));
    }

    let mut table = TableSchema::new(table_id, name, schema_version);
    for i in 0..count {
        let attr_name = cursor.string("attribute name")?;
        let code = cursor.word("element kind")?;
        let kind = ElementKind::from_code(code)
            .ok_or_else(|| format!("attribute {} has unknown element kind {}", i, code))?;
        let array_size = cursor.word("array size")?;
        let flags = cursor.word("attribute flags")?;

        if attr_name.is_empty() {
            return Err(format!("attribute {} has an empty name", i));
        }
        if table.attributes().iter().any(|a| a.name() == attr_name) {
            return Err(format!("attribute name '{}' repeated", attr_name));
        }
        if array_size == 0 {
            return Err(format!("attribute '{}' has zero array size", attr_name));
        }
        let bytes = kind.width() as u64 * array_size as u64;
        if bytes > MAX_ATTRIBUTE_BYTES {
            return Err(format!(
                "attribute '{}' holds {} bytes, limit is {}",
                attr_name, bytes, MAX_ATTRIBUTE_BYTES
            ));
        }
        if flags & !KNOWN_FLAGS != 0 {
            return Err(format!("attribute '{}' has unknown flags {:#x}", attr_name, flags));
        }
        if flags & FLAG_PRIMARY_KEY != 0 && flags & FLAG_NULLABLE != 0 {
            return Err(format!("primary key attribute '{}' is nullable", attr_name));
        }

        let mut column = ColumnDef::new(attr_name, kind).with_array_size(array_size);
        column.primary_key = flags & FLAG_PRIMARY_KEY != 0;
        column.nullable = flags & FLAG_NULLABLE != 0;
        column.variable = flags & FLAG_VARIABLE != 0;
        table.create_attr(column);
    }

    if cursor.remaining() != 0 {
        return Err(format!(
            "{} trailing bytes after attribute list",
            cursor.remaining()
        ));
    }
    if !table.has_primary_key() {
        return Err(format!("table '{}' has no primary key", table.get_table_name()));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encode_table_descriptor;
    use byteorder::WriteBytesExt;

    fn orders() -> TableSchema {
        let mut t = TableSchema::new(7, "orders", 2);
        t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        t.create_attr(ColumnDef::char("name", 20).nullable());
        t.create_attr(ColumnDef::varchar("note", 100).nullable());
        t.create_attr(ColumnDef::new("qty", ElementKind::Uint16).with_array_size(3));
        t
    }

    #[test]
    fn test_parse_preserves_attributes() {
        let original = orders();
        let parsed = parse_table_descriptor(&encode_table_descriptor(&original)).unwrap();

        assert_eq!(parsed.get_table_id(), 7);
        assert_eq!(parsed.get_table_name(), "orders");
        assert_eq!(parsed.schema_version(), 2);
        assert_eq!(parsed.get_no_of_attributes(), original.get_no_of_attributes());
        for (a, b) in parsed.attributes().iter().zip(original.attributes()) {
            assert_eq!(a.size(), b.size());
            assert_eq!(a.array_size(), b.array_size());
            assert_eq!(a.null_bit_index(), b.null_bit_index());
            assert_eq!(a.attr_id(), b.attr_id());
        }
        assert_eq!(parsed.variable_attrib_positions(), &[2]);
        assert_eq!(parsed.no_of_nullable(), 2);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = encode_table_descriptor(&orders());
        bytes[3] = 9;
        let err = parse_table_descriptor(&bytes).unwrap_err();
        assert!(err.contains("version 9"));
    }

    #[test]
    fn test_rejects_truncated_blob() {
        let bytes = encode_table_descriptor(&orders());
        let err = parse_table_descriptor(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(err.contains("ends inside"));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_table_descriptor(&orders());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(parse_table_descriptor(&bytes).is_err());
    }

    #[test]
    fn test_rejects_table_without_primary_key() {
        let mut t = TableSchema::new(1, "nokey", 1);
        t.create_attr(ColumnDef::new("x", ElementKind::Int32));
        let err = parse_table_descriptor(&encode_table_descriptor(&t)).unwrap_err();
        assert!(err.contains("no primary key"));
    }

    #[test]
    fn test_rejects_nullable_primary_key() {
        let mut t = TableSchema::new(1, "t", 1);
        t.create_attr(ColumnDef::new("k", ElementKind::Int32).primary_key().nullable());
        assert!(parse_table_descriptor(&encode_table_descriptor(&t)).is_err());
    }

    #[test]
    fn test_rejects_empty_attribute_list() {
        let mut bytes = Vec::new();
        for w in [TABLE_DESCRIPTOR_VERSION, 1, 1, 1] {
            bytes.write_u32::<BigEndian>(w).unwrap();
        }
        bytes.extend_from_slice(b"t\0\0\0");
        bytes.write_u32::<BigEndian>(0).unwrap();
        let err = parse_table_descriptor(&bytes).unwrap_err();
        assert!(err.contains("no attributes"));
    }

    fn keyed_with(column: ColumnDef) -> TableSchema {
        let mut t = TableSchema::new(3, "wide", 1);
        t.create_attr(ColumnDef::new("k", ElementKind::Int32).primary_key());
        t.create_attr(column);
        t
    }

    #[test]
    fn test_rejects_array_size_overflowing_word_count() {
        let big = ColumnDef::new("big", ElementKind::Uint64).with_array_size(0x8000_0000);
        let t = keyed_with(big);
        assert_eq!(t[1].get_size_in_words(), 0x1_0000_0000);

        let err = parse_table_descriptor(&encode_table_descriptor(&t)).unwrap_err();
        assert!(err.contains("'big' holds 17179869184 bytes"), "got {}", err);
    }

    #[test]
    fn test_rejects_attribute_longer_than_log_entry_limit() {
        let fixed = keyed_with(ColumnDef::char("blob", 70_000));
        let err = parse_table_descriptor(&encode_table_descriptor(&fixed)).unwrap_err();
        assert!(err.contains("limit is 65535"), "got {}", err);

        let variable = keyed_with(ColumnDef::varchar("note", 70_000).nullable());
        let err = parse_table_descriptor(&encode_table_descriptor(&variable)).unwrap_err();
        assert!(err.contains("'note'"), "got {}", err);
    }

    #[test]
    fn test_accepts_attribute_at_size_limit() {
        let t = keyed_with(ColumnDef::char("blob", 65_535));
        let parsed = parse_table_descriptor(&encode_table_descriptor(&t)).unwrap();
        assert_eq!(parsed[1].get_size_in_bytes(), 65_535);
        assert_eq!(parsed[1].get_size_in_words(), 16_384);
    }
}
