//! Fixture encoders

use crate::descriptor::{FLAG_NULLABLE, FLAG_PRIMARY_KEY, FLAG_VARIABLE};
use crate::format::{
    footer_bytes, padded_len, FileHeader, FileType, SectionType, BACKUP_FORMAT_VERSION,
    BACKUP_MAGIC, BYTE_ORDER_MARKER, FRAGMENT_FOOTER_WORDS, FRAGMENT_HEADER_WORDS,
    GCP_ENTRY_WORDS, TABLE_DESCRIPTOR_VERSION,
};
use crate::paths::BackupPaths;
use restore_core::{AttributeDesc, ElementKind, LogEntryType, Scalar, TableSchema};
use std::io;
use std::path::{Path, PathBuf};

/// Byte order of the simulated producing node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOrder {
    /// Little-endian producer
    Little,
    /// Big-endian producer
    Big,
}

impl ProducerOrder {
    /// Order of this host
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ProducerOrder::Little
        } else {
            ProducerOrder::Big
        }
    }

    /// The other order
    pub fn reversed(self) -> Self {
        match self {
            ProducerOrder::Little => ProducerOrder::Big,
            ProducerOrder::Big => ProducerOrder::Little,
        }
    }

    fn marker(self) -> [u8; 4] {
        match self {
            ProducerOrder::Little => BYTE_ORDER_MARKER.to_le_bytes(),
            ProducerOrder::Big => BYTE_ORDER_MARKER.to_be_bytes(),
        }
    }
}

macro_rules! scalar_bytes {
    ($order:expr, $v:expr) => {
        match $order {
            ProducerOrder::Little => $v.to_le_bytes().to_vec(),
            ProducerOrder::Big => $v.to_be_bytes().to_vec(),
        }
    };
}

fn encode_scalar(scalar: Scalar, order: ProducerOrder) -> Vec<u8> {
    match scalar {
        Scalar::Int8(v) => scalar_bytes!(order, v),
        Scalar::Uint8(v) | Scalar::Char(v) => vec![v],
        Scalar::Int16(v) => scalar_bytes!(order, v),
        Scalar::Uint16(v) => scalar_bytes!(order, v),
        Scalar::Int32(v) => scalar_bytes!(order, v),
        Scalar::Uint32(v) => scalar_bytes!(order, v),
        Scalar::Int64(v) => scalar_bytes!(order, v),
        Scalar::Uint64(v) => scalar_bytes!(order, v),
        Scalar::Float32(v) => scalar_bytes!(order, v),
        Scalar::Float64(v) => scalar_bytes!(order, v),
    }
}

/// Value of one attribute in a fixture row or log record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// NULL (omitted from the record)
    Null,
    /// Elements written in the producer's byte order
    Scalars(Vec<Scalar>),
    /// Raw bytes written as-is (character data)
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Encoded value bytes before word padding.
    ///
    /// Fixed-width values are padded to the attribute's full size, with spaces
    /// for character attributes and zeros otherwise.
    fn encode(&self, desc: &AttributeDesc, order: ProducerOrder) -> Vec<u8> {
        let mut bytes = match self {
            FieldValue::Null => Vec::new(),
            FieldValue::Scalars(scalars) => scalars
                .iter()
                .flat_map(|s| encode_scalar(*s, order))
                .collect(),
            FieldValue::Bytes(bytes) => bytes.clone(),
        };
        if !desc.is_variable() {
            let pad = if desc.kind() == ElementKind::Char { b' ' } else { 0 };
            bytes.resize(desc.get_size_in_bytes(), pad);
        }
        bytes
    }

    fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Scalars(vec![Scalar::$variant(v)])
                }
            }
        )*
    };
}

field_value_from!(
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

fn put_word(buf: &mut Vec<u8>, word: u32) {
    buf.extend_from_slice(&word.to_be_bytes());
}

fn put_padded(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + padded_len(bytes.len()) - bytes.len(), 0);
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_word(buf, s.len() as u32);
    put_padded(buf, s.as_bytes());
}

fn put_section(buf: &mut Vec<u8>, section: SectionType, payload: &[u8]) {
    put_word(buf, section.code());
    put_word(buf, 2 + (payload.len() / 4) as u32);
    buf.extend_from_slice(payload);
}

/// Encode a table descriptor blob
pub fn encode_table_descriptor(table: &TableSchema) -> Vec<u8> {
    let mut buf = Vec::new();
    put_word(&mut buf, TABLE_DESCRIPTOR_VERSION);
    put_word(&mut buf, table.get_table_id());
    put_word(&mut buf, table.schema_version());
    put_string(&mut buf, table.get_table_name());
    put_word(&mut buf, table.get_no_of_attributes() as u32);
    for desc in table.attributes() {
        put_string(&mut buf, desc.name());
        put_word(&mut buf, desc.kind().code());
        put_word(&mut buf, desc.array_size());
        let mut flags = 0;
        if desc.is_primary_key() {
            flags |= FLAG_PRIMARY_KEY;
        }
        if desc.is_nullable() {
            flags |= FLAG_NULLABLE;
        }
        if desc.is_variable() {
            flags |= FLAG_VARIABLE;
        }
        put_word(&mut buf, flags);
    }
    buf
}

/// Encode a row record payload (without its length word).
///
/// `values` holds one entry per attribute, in attribute order.
pub fn encode_row(table: &TableSchema, values: &[FieldValue], order: ProducerOrder) -> Vec<u8> {
    assert_eq!(
        values.len(),
        table.get_no_of_attributes(),
        "one value per attribute"
    );

    let mut bitmap = vec![0u8; table.null_bitmask_size()];
    for desc in table.attributes() {
        if let Some(bit) = desc.null_bit_index() {
            if values[desc.attr_id() as usize].is_null() {
                bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
            }
        }
    }

    let mut buf = bitmap;
    for p in table
        .fixed_key_positions()
        .iter()
        .chain(table.fixed_attrib_positions())
    {
        let desc = &table[*p];
        if desc.is_nullable() && values[*p].is_null() {
            continue;
        }
        let bytes = values[*p].encode(desc, order);
        let mut stored = bytes;
        stored.resize(desc.get_size_in_words() as usize * 4, 0);
        buf.extend_from_slice(&stored);
    }
    for p in table.variable_attrib_positions() {
        let value = &values[*p];
        if value.is_null() {
            continue;
        }
        let bytes = value.encode(&table[*p], order);
        put_word(&mut buf, bytes.len() as u32);
        put_word(&mut buf, table[*p].attr_id());
        put_padded(&mut buf, &bytes);
    }
    buf
}

/// Writes fixture files for one node's share of a backup
#[derive(Debug, Clone)]
pub struct BackupWriter {
    paths: BackupPaths,
    producer_version: u32,
    order: ProducerOrder,
}

impl BackupWriter {
    /// Writer for `node_id`'s files of backup `backup_id` in `dir`
    pub fn new(dir: impl AsRef<Path>, backup_id: u32, node_id: u32) -> Self {
        BackupWriter {
            paths: BackupPaths::new(dir, backup_id, node_id),
            producer_version: 0x0001_0000,
            order: ProducerOrder::native(),
        }
    }

    /// Set producer byte order (builder pattern)
    pub fn with_order(mut self, order: ProducerOrder) -> Self {
        self.order = order;
        self
    }

    /// Set producer software version (builder pattern)
    pub fn with_producer_version(mut self, version: u32) -> Self {
        self.producer_version = version;
        self
    }

    /// File paths this writer targets
    pub fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    /// Producer byte order
    pub fn order(&self) -> ProducerOrder {
        self.order
    }

    /// File header for `file_type`
    pub fn header(&self, file_type: FileType) -> FileHeader {
        FileHeader {
            magic: BACKUP_MAGIC,
            format_version: BACKUP_FORMAT_VERSION,
            producer_version: self.producer_version,
            file_type: file_type.code(),
            node_id: self.paths.node_id(),
            backup_id: self.paths.backup_id(),
            byte_order: self.order.marker(),
        }
    }

    /// Start a control file
    pub fn control(&self) -> ControlFile<'_> {
        ControlFile {
            writer: self,
            tables: Vec::new(),
            start_gcp: 0,
            stop_gcp: 0,
        }
    }

    /// Start a data file
    pub fn data(&self) -> DataFile<'_> {
        DataFile {
            writer: self,
            body: Vec::new(),
        }
    }

    /// Start a log file
    pub fn log(&self) -> LogFile<'_> {
        LogFile {
            writer: self,
            body: Vec::new(),
        }
    }

    fn assemble(&self, file_type: FileType, body: &[u8]) -> Vec<u8> {
        let mut bytes = self.header(file_type).to_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&footer_bytes());
        bytes
    }
}

/// Control file under construction
#[derive(Debug)]
pub struct ControlFile<'w> {
    writer: &'w BackupWriter,
    tables: Vec<TableSchema>,
    start_gcp: u32,
    stop_gcp: u32,
}

impl ControlFile<'_> {
    /// Add a table (builder pattern)
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Set start and stop global checkpoints (builder pattern)
    pub fn gcp(mut self, start: u32, stop: u32) -> Self {
        self.start_gcp = start;
        self.stop_gcp = stop;
        self
    }

    /// Encoded file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();

        let mut list = Vec::new();
        for t in &self.tables {
            put_word(&mut list, t.get_table_id());
        }
        put_section(&mut body, SectionType::TableList, &list);

        for t in &self.tables {
            put_section(
                &mut body,
                SectionType::TableDescription,
                &encode_table_descriptor(t),
            );
        }

        let mut gcp = Vec::new();
        put_word(&mut gcp, self.start_gcp);
        put_word(&mut gcp, self.stop_gcp);
        debug_assert_eq!(2 + gcp.len() / 4, GCP_ENTRY_WORDS as usize);
        put_section(&mut body, SectionType::GcpEntry, &gcp);

        self.writer.assemble(FileType::Control, &body)
    }

    /// Write to the control file path
    pub fn write(&self) -> io::Result<PathBuf> {
        let path = self.writer.paths.ctl_file();
        std::fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

/// Data file under construction
#[derive(Debug)]
pub struct DataFile<'w> {
    writer: &'w BackupWriter,
    body: Vec<u8>,
}

impl DataFile<'_> {
    /// Append a fragment of `table` holding `rows` (builder pattern)
    pub fn fragment(
        mut self,
        table: &TableSchema,
        fragment_no: u32,
        rows: &[Vec<FieldValue>],
    ) -> Self {
        let mut header = Vec::new();
        put_word(&mut header, table.get_table_id());
        put_word(&mut header, fragment_no);
        debug_assert_eq!(2 + header.len() / 4, FRAGMENT_HEADER_WORDS as usize);
        put_section(&mut self.body, SectionType::FragmentHeader, &header);

        let mut hasher = crc32fast::Hasher::new();
        for row in rows {
            let payload = encode_row(table, row, self.writer.order);
            let len = ((payload.len() / 4) as u32).to_be_bytes();
            hasher.update(&len);
            hasher.update(&payload);
            self.body.extend_from_slice(&len);
            self.body.extend_from_slice(&payload);
        }
        put_word(&mut self.body, 0);

        let mut footer = Vec::new();
        put_word(&mut footer, table.get_table_id());
        put_word(&mut footer, fragment_no);
        put_word(&mut footer, rows.len() as u32);
        put_word(&mut footer, hasher.finalize());
        debug_assert_eq!(2 + footer.len() / 4, FRAGMENT_FOOTER_WORDS as usize);
        put_section(&mut self.body, SectionType::FragmentFooter, &footer);
        self
    }

    /// Encoded file
    pub fn to_bytes(&self) -> Vec<u8> {
        self.writer.assemble(FileType::Data, &self.body)
    }

    /// Write to the path of data file `file_no`
    pub fn write(&self, file_no: u32) -> io::Result<PathBuf> {
        let path = self.writer.paths.data_file(file_no);
        std::fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

/// Log file under construction
#[derive(Debug)]
pub struct LogFile<'w> {
    writer: &'w BackupWriter,
    body: Vec<u8>,
}

impl LogFile<'_> {
    /// Append a log record carrying `(attr_id, value)` pairs (builder pattern).
    ///
    /// A [`FieldValue::Null`] is written as a zero-length entry.
    pub fn entry(
        mut self,
        entry_type: LogEntryType,
        table: &TableSchema,
        gci: u32,
        values: &[(u32, FieldValue)],
    ) -> Self {
        let mut record = Vec::new();
        put_word(&mut record, table.get_table_id());
        put_word(&mut record, entry_type.code());
        put_word(&mut record, gci);
        for (attr_id, value) in values {
            let bytes = match table.attribute_position(*attr_id) {
                Some(p) if !value.is_null() => value.encode(&table[p], self.writer.order),
                _ => Vec::new(),
            };
            put_word(&mut record, (attr_id << 16) | bytes.len() as u32);
            put_padded(&mut record, &bytes);
        }
        put_word(&mut self.body, (record.len() / 4) as u32);
        self.body.extend_from_slice(&record);
        self
    }

    /// Encoded file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = self.body.clone();
        put_word(&mut body, 0);
        self.writer.assemble(FileType::Log, &body)
    }

    /// Write to the log file path
    pub fn write(&self) -> io::Result<PathBuf> {
        let path = self.writer.paths.log_file();
        std::fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder};
    use restore_core::ColumnDef;

    #[test]
    fn test_scalar_encoding_follows_order() {
        assert_eq!(encode_scalar(Scalar::Uint16(0x0102), ProducerOrder::Big), vec![1, 2]);
        assert_eq!(encode_scalar(Scalar::Uint16(0x0102), ProducerOrder::Little), vec![2, 1]);
        assert_eq!(encode_scalar(Scalar::Char(b'a'), ProducerOrder::Big), vec![b'a']);
    }

    #[test]
    fn test_section_length_counts_framing() {
        let mut buf = Vec::new();
        put_section(&mut buf, SectionType::GcpEntry, &[0; 8]);
        assert_eq!(BigEndian::read_u32(&buf[0..4]), 4);
        assert_eq!(BigEndian::read_u32(&buf[4..8]), GCP_ENTRY_WORDS);
    }

    #[test]
    fn test_control_file_ends_with_footer() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = TableSchema::new(1, "t", 1);
        t.create_attr(ColumnDef::new("k", ElementKind::Int32).primary_key());
        let writer = BackupWriter::new(dir.path(), 3, 4);
        let bytes = writer.control().table(t).gcp(1, 2).to_bytes();
        assert_eq!(&bytes[..8], b"CLBACKUP");
        assert_eq!(&bytes[bytes.len() - 12..], &footer_bytes()[..]);
    }

    #[test]
    fn test_option_into_field_value() {
        assert_eq!(FieldValue::from(None::<i32>), FieldValue::Null);
        assert_eq!(
            FieldValue::from(Some(5i32)),
            FieldValue::Scalars(vec![Scalar::Int32(5)])
        );
    }
}
