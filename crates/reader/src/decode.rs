//! Row and attribute value decoding shared by the data and log readers.
//!
//! # Row record payload
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────────────┬──────────────────────────────┐
//! │ Null bitmap  │ Fixed keys      │ Fixed non-keys   │ Variable entries             │
//! │ ceil(n/32) w │ size_in_words w │ nulls omitted    │ [len][attr id][data, padded] │
//! └──────────────┴─────────────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! Bit `i` of the null bitmap is bit `i % 8` of byte `i / 8`. Absent variable
//! entries are NULL.

use crate::backup_file::WordOrder;
use crate::format::padded_len;
use byteorder::{BigEndian, ByteOrder};
use restore_core::{AttributeData, AttributeDesc, RestoreError, TableSchema, Tuple};
use std::path::Path;
use thiserror::Error;

/// Problem found while decoding one record
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum DecodeError {
    #[error("record ends inside {0}")]
    Short(&'static str),

    #[error("unknown attribute id {attr_id}")]
    UnknownAttribute { table_id: u32, attr_id: u32 },

    #[error("unknown table id {0}")]
    UnknownTable(u32),

    #[error("unknown log event type {0}")]
    BadEventType(u32),

    #[error("attribute '{0}' is not variable width")]
    NotVariable(String),

    #[error("attribute '{name}' value of {len} bytes is invalid (max {max}, element width {width})")]
    BadLength {
        name: String,
        len: usize,
        max: usize,
        width: usize,
    },

    #[error("attribute '{0}' appears twice")]
    Duplicate(String),

    #[error("attribute '{0}' has a value but its null bit is set")]
    NullConflict(String),

    #[error("non-nullable attribute '{0}' is missing")]
    Missing(String),

    #[error("NULL value for non-nullable attribute '{0}'")]
    NullNotAllowed(String),
}

impl DecodeError {
    /// Attach file context
    pub(crate) fn into_restore(self, path: &Path, offset: u64) -> RestoreError {
        match self {
            DecodeError::UnknownTable(table_id) => RestoreError::TableNotFound { table_id },
            DecodeError::UnknownAttribute { table_id, attr_id } => {
                RestoreError::AttributeNotFound { table_id, attr_id }
            }
            other => RestoreError::corrupt(path, offset, other.to_string()),
        }
    }
}

/// Sequential reader over a record payload
pub(crate) struct RecordCursor<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> RecordCursor<'b> {
    pub(crate) fn new(bytes: &'b [u8]) -> Self {
        RecordCursor { bytes, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize, what: &'static str) -> Result<&'b [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Short(what));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn word(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        self.take(4, what).map(BigEndian::read_u32)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

fn null_bit(bitmap: &[u8], index: u32) -> bool {
    bitmap[(index / 8) as usize] & (1 << (index % 8)) != 0
}

/// Store `bytes` as the value of `desc` and fix up its byte order.
///
/// Fixed-width values must be exactly the attribute's full size. Variable
/// values may be shorter but must be whole elements.
pub(crate) fn fill_value(
    desc: &AttributeDesc,
    data: &mut AttributeData,
    bytes: &[u8],
    order: WordOrder,
) -> Result<(), DecodeError> {
    let width = desc.kind().width();
    let max = desc.get_size_in_bytes();
    let valid = if desc.is_variable() {
        bytes.len() <= max && bytes.len() % width == 0
    } else {
        bytes.len() == max
    };
    if !valid {
        return Err(DecodeError::BadLength {
            name: desc.name().to_string(),
            len: bytes.len(),
            max,
            width,
        });
    }

    data.fill(bytes);
    let count = if desc.is_variable() {
        Some((bytes.len() / width) as u32)
    } else {
        None
    };
    // lengths were checked above, so the element count always fits
    order.twiddle(desc, data, count);
    Ok(())
}

fn decode_fixed(
    table: &TableSchema,
    positions: &[usize],
    bitmap: &[u8],
    tuple: &mut Tuple<'_>,
    cursor: &mut RecordCursor<'_>,
    order: WordOrder,
) -> Result<(), DecodeError> {
    for &p in positions {
        let desc = &table[p];
        if let Some(bit) = desc.null_bit_index() {
            if null_bit(bitmap, bit) {
                continue;
            }
        }
        let stored = cursor.take(desc.get_size_in_words() as usize * 4, "fixed attribute")?;
        let value = stored
            .get(..desc.get_size_in_bytes())
            .ok_or(DecodeError::Short("fixed attribute"))?;
        fill_value(desc, tuple.get_data_mut(p), value, order)?;
    }
    Ok(())
}

/// Decode one row payload into `tuple`.
///
/// `tuple` must have been prepared for `table`, so every value starts NULL.
pub(crate) fn decode_row(
    table: &TableSchema,
    tuple: &mut Tuple<'_>,
    payload: &[u8],
    order: WordOrder,
) -> Result<(), DecodeError> {
    let mut cursor = RecordCursor::new(payload);
    let bitmap = cursor.take(table.null_bitmask_size(), "null bitmap")?;

    decode_fixed(table, table.fixed_key_positions(), bitmap, tuple, &mut cursor, order)?;
    decode_fixed(table, table.fixed_attrib_positions(), bitmap, tuple, &mut cursor, order)?;

    while cursor.remaining() > 0 {
        let len = cursor.word("variable entry length")? as usize;
        let attr_id = cursor.word("variable entry attribute id")?;
        let p = table
            .attribute_position(attr_id)
            .ok_or(DecodeError::UnknownAttribute {
                table_id: table.get_table_id(),
                attr_id,
            })?;
        let desc = &table[p];
        if !desc.is_variable() {
            return Err(DecodeError::NotVariable(desc.name().to_string()));
        }
        if !tuple.get_data(p).is_null() {
            return Err(DecodeError::Duplicate(desc.name().to_string()));
        }
        if let Some(bit) = desc.null_bit_index() {
            if null_bit(bitmap, bit) {
                return Err(DecodeError::NullConflict(desc.name().to_string()));
            }
        }
        let stored = cursor.take(padded_len(len), "variable attribute")?;
        fill_value(desc, tuple.get_data_mut(p), &stored[..len], order)?;
    }

    for &p in table.variable_attrib_positions() {
        let desc = &table[p];
        if !desc.is_nullable() && tuple.get_data(p).is_null() {
            return Err(DecodeError::Missing(desc.name().to_string()));
        }
    }
    Ok(())
}

/// Largest encoded row for `table`, length word included
pub(crate) fn max_row_bytes(table: &TableSchema) -> usize {
    let fixed: usize = table
        .fixed_keys()
        .chain(table.fixed_attribs())
        .map(|d| d.get_size_in_words() as usize * 4)
        .sum();
    let variable: usize = table
        .variable_attribs()
        .map(|d| 8 + padded_len(d.get_size_in_bytes()))
        .sum();
    4 + table.null_bitmask_size() + fixed + variable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode_row, FieldValue, ProducerOrder};
    use restore_core::{ColumnDef, ElementKind, Scalar};

    fn people() -> TableSchema {
        let mut t = TableSchema::new(1, "people", 1);
        t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        t.create_attr(ColumnDef::char("name", 20).nullable());
        t
    }

    fn mixed() -> TableSchema {
        let mut t = TableSchema::new(2, "mixed", 1);
        t.create_attr(ColumnDef::new("k", ElementKind::Uint64).primary_key());
        t.create_attr(ColumnDef::new("score", ElementKind::Float32).nullable());
        t.create_attr(ColumnDef::varchar("tag", 12));
        t.create_attr(
            ColumnDef::new("hist", ElementKind::Int16)
                .with_array_size(4)
                .variable()
                .nullable(),
        );
        t
    }

    fn decode<'a>(
        table: &'a TableSchema,
        payload: &[u8],
        order: WordOrder,
    ) -> Result<Tuple<'a>, DecodeError> {
        let mut tuple = Tuple::new(table);
        decode_row(table, &mut tuple, payload, order)?;
        Ok(tuple)
    }

    #[test]
    fn test_decode_fixed_row() {
        let t = people();
        let payload = encode_row(
            &t,
            &[FieldValue::from(1i32), FieldValue::from("alice")],
            ProducerOrder::native(),
        );
        let tuple = decode(&t, &payload, WordOrder::host()).unwrap();
        assert_eq!(tuple.get_data(0).value::<i32>(), Some(1));
        assert_eq!(tuple.get_data(1).as_str(), Some("alice"));
        assert_eq!(tuple.get_data(1).size(), 20);
    }

    #[test]
    fn test_null_fixed_attribute_takes_no_space() {
        let t = people();
        let payload = encode_row(
            &t,
            &[FieldValue::from(2i32), FieldValue::Null],
            ProducerOrder::native(),
        );
        // bitmap word + id word
        assert_eq!(payload.len(), 8);
        let tuple = decode(&t, &payload, WordOrder::host()).unwrap();
        assert_eq!(tuple.get_data(0).value::<i32>(), Some(2));
        assert!(tuple.get_data(1).is_null());
    }

    #[test]
    fn test_decode_variable_attributes() {
        let t = mixed();
        let values = [
            FieldValue::from(99u64),
            FieldValue::Null,
            FieldValue::from("red"),
            FieldValue::Scalars(vec![Scalar::Int16(-1), Scalar::Int16(300)]),
        ];
        let payload = encode_row(&t, &values, ProducerOrder::native());
        let tuple = decode(&t, &payload, WordOrder::host()).unwrap();
        assert_eq!(tuple.get_data(0).value::<u64>(), Some(99));
        assert!(tuple.get_data(1).is_null());
        assert_eq!(tuple.get_data(2).as_bytes(), Some(&b"red"[..]));
        assert_eq!(tuple.get_data(3).values::<i16>(), vec![-1, 300]);
    }

    #[test]
    fn test_foreign_order_is_twiddled() {
        let t = mixed();
        let values = [
            FieldValue::from(0x0102_0304_0506_0708u64),
            FieldValue::from(1.5f32),
            FieldValue::from("x"),
            FieldValue::Null,
        ];
        let payload = encode_row(&t, &values, ProducerOrder::native().reversed());
        let tuple = decode(&t, &payload, WordOrder::swapped()).unwrap();
        assert_eq!(tuple.get_data(0).value::<u64>(), Some(0x0102_0304_0506_0708));
        assert_eq!(tuple.get_data(1).value::<f32>(), Some(1.5));
    }

    #[test]
    fn test_missing_non_nullable_variable_is_error() {
        let t = mixed();
        let values = [FieldValue::from(1u64), FieldValue::Null, FieldValue::Null, FieldValue::Null];
        let payload = encode_row(&t, &values, ProducerOrder::native());
        assert_eq!(
            decode(&t, &payload, WordOrder::host()).unwrap_err(),
            DecodeError::Missing("tag".to_string())
        );
    }

    #[test]
    fn test_short_payload_is_error() {
        let t = people();
        let payload = encode_row(
            &t,
            &[FieldValue::from(1i32), FieldValue::from("bob")],
            ProducerOrder::native(),
        );
        let err = decode(&t, &payload[..payload.len() - 4], WordOrder::host()).unwrap_err();
        assert!(matches!(err, DecodeError::Short(_)));
    }

    #[test]
    fn test_unknown_variable_attribute_id() {
        let t = mixed();
        let values = [
            FieldValue::from(1u64),
            FieldValue::Null,
            FieldValue::from("a"),
            FieldValue::Null,
        ];
        let mut payload = encode_row(&t, &values, ProducerOrder::native());
        // attr id word of the single variable entry
        let at = payload.len() - 8;
        BigEndian::write_u32(&mut payload[at..at + 4], 42);
        assert_eq!(
            decode(&t, &payload, WordOrder::host()).unwrap_err(),
            DecodeError::UnknownAttribute { table_id: 2, attr_id: 42 }
        );
    }

    #[test]
    fn test_fill_value_rejects_bad_lengths() {
        let t = mixed();
        let mut data = AttributeData::new(ElementKind::Int16);
        // odd byte count for 16-bit elements
        assert!(fill_value(&t[3], &mut data, &[1, 2, 3], WordOrder::host()).is_err());
        // more than array size allows
        assert!(fill_value(&t[3], &mut data, &[0; 10], WordOrder::host()).is_err());
        let mut fixed = AttributeData::new(ElementKind::Uint64);
        assert!(fill_value(&t[0], &mut fixed, &[0; 4], WordOrder::host()).is_err());
    }

    #[test]
    fn test_max_row_bytes() {
        let t = people();
        // length + bitmap + id + name(5 words)
        assert_eq!(max_row_bytes(&t), 4 + 4 + 4 + 20);
    }

    #[test]
    fn test_unknown_table_maps_to_schema_error() {
        let err = DecodeError::UnknownTable(5).into_restore(Path::new("x"), 0);
        assert!(matches!(err, RestoreError::TableNotFound { table_id: 5 }));
    }
}
