//! Shared fixtures for reader integration tests

#![allow(dead_code)]

use restore_core::{ColumnDef, ElementKind, RestoreResult, TableSchema};
use restore_reader::testing::FieldValue;
use restore_reader::{FragmentStatus, RestoreDataIterator, RestoreMetaData};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const BACKUP_ID: u32 = 4;
pub const NODE_ID: u32 = 2;

/// `(id int32 pk, name nullable char(20))`
pub fn people() -> TableSchema {
    let mut t = TableSchema::new(1, "people", 1);
    t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
    t.create_attr(ColumnDef::char("name", 20).nullable());
    t
}

/// A table exercising every partition and array values
pub fn orders() -> TableSchema {
    let mut t = TableSchema::new(2, "orders", 3);
    t.create_attr(ColumnDef::new("order_id", ElementKind::Uint64).primary_key());
    t.create_attr(ColumnDef::new("amount", ElementKind::Float64).nullable());
    t.create_attr(ColumnDef::varchar("note", 64).nullable());
    t.create_attr(ColumnDef::new("qty", ElementKind::Int16).with_array_size(4));
    t
}

pub fn person(id: i32, name: Option<&str>) -> Vec<FieldValue> {
    vec![FieldValue::from(id), FieldValue::from(name)]
}

pub fn order(id: u64, amount: Option<f64>, note: Option<&str>, qty: [i16; 4]) -> Vec<FieldValue> {
    use restore_core::Scalar;
    vec![
        FieldValue::from(id),
        FieldValue::from(amount),
        FieldValue::from(note),
        FieldValue::Scalars(qty.iter().map(|q| Scalar::Int16(*q)).collect()),
    ]
}

/// Load metadata, panicking on failure
pub fn load(dir: &Path) -> RestoreMetaData {
    let mut meta = RestoreMetaData::new(dir, NODE_ID, BACKUP_ID);
    meta.load_content().unwrap();
    meta
}

/// Row summary used to compare decoded fragments: (table id, raw values)
pub type RowImage = (u32, Vec<Option<Vec<u8>>>);

/// Read every fragment of a data file, validating each footer
pub fn drain(data: &mut RestoreDataIterator<'_>) -> RestoreResult<Vec<RowImage>> {
    let mut rows = Vec::new();
    while let FragmentStatus::Available { table_id, .. } = data.read_fragment_header()? {
        while let Some(tuple) = data.get_next_tuple()? {
            let values = tuple
                .iter()
                .map(|(_, d)| (!d.is_null()).then(|| d.raw().to_vec()))
                .collect();
            rows.push((table_id, values));
        }
        data.validate_fragment_footer()?;
    }
    Ok(rows)
}

pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

pub fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
    file.sync_all().unwrap();
}

/// XOR the byte at `offset` with 0xFF
pub fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut buf = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut buf).unwrap();
    buf[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&buf).unwrap();
    file.sync_all().unwrap();
}

pub fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}
