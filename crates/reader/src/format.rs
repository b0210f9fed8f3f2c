//! On-disk framing shared by control, data and log files.
//!
//! Framing words (section types, lengths, identifiers, counts) are big-endian
//! regardless of the producing node. Attribute payload bytes are in the
//! producer's native order; the header's byte-order marker says which.
//!
//! # File Header (32 bytes)
//!
//! ```text
//! ┌────────────────┬──────────┬──────────┬──────────┬──────────┬──────────┬────────────┐
//! │ Magic (8)      │ Fmt (4)  │ Prod (4) │ Type (4) │ Node (4) │ Bkup (4) │ Order (4)  │
//! │ "CLBACKUP"     │ BE       │ BE       │ BE       │ BE       │ BE       │ native     │
//! └────────────────┴──────────┴──────────┴──────────┴──────────┴──────────┴────────────┘
//! ```
//!
//! # Sections
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────────────────┐
//! │ Type (4, BE) │ Length in words (4, BE)      │ Payload             │
//! └──────────────┴──────────────────────────────┴─────────────────────┘
//! ```
//!
//! The length counts the two framing words. Every file ends with a footer
//! section `[FILE_FOOTER][3][FILE_FOOTER_MARKER]`.

use byteorder::{BigEndian, ByteOrder, NativeEndian};

/// Magic bytes identifying a backup file: "CLBACKUP"
pub const BACKUP_MAGIC: [u8; 8] = *b"CLBACKUP";

/// Backup file format version understood by this reader
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 32;

/// Byte-order marker as written by the producer in its native order
pub const BYTE_ORDER_MARKER: u32 = 0x1234_5678;

/// Marker word closing every file
pub const FILE_FOOTER_MARKER: u32 = 0xB4C4_E0FF;

/// Size of the file footer section in bytes
pub const FILE_FOOTER_SIZE: usize = 12;

/// Table descriptor encoding version
pub const TABLE_DESCRIPTOR_VERSION: u32 = 1;

/// Largest attribute value in bytes.
///
/// A log attribute entry stores its byte length in the low 16 bits of its
/// header word, so no attribute may hold more than this.
pub const MAX_ATTRIBUTE_BYTES: u64 = 0xFFFF;

/// Length in words of a fragment header section
pub const FRAGMENT_HEADER_WORDS: u32 = 4;

/// Length in words of a fragment footer section
pub const FRAGMENT_FOOTER_WORDS: u32 = 6;

/// Length in words of a GCP entry section
pub const GCP_ENTRY_WORDS: u32 = 4;

/// Kind of backup file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Schema and checkpoint bounds
    Control,
    /// Row data, fragment by fragment
    Data,
    /// Operation log
    Log,
}

impl FileType {
    /// On-disk code
    pub fn code(self) -> u32 {
        match self {
            FileType::Control => 1,
            FileType::Data => 2,
            FileType::Log => 3,
        }
    }

    /// Decode an on-disk code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(FileType::Control),
            2 => Some(FileType::Data),
            3 => Some(FileType::Log),
            _ => None,
        }
    }
}

/// Section type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    /// Identifiers of the tables in the backup
    TableList,
    /// One table descriptor blob
    TableDescription,
    /// Start and stop global checkpoint
    GcpEntry,
    /// Start of a data fragment
    FragmentHeader,
    /// End of a data fragment
    FragmentFooter,
    /// End of file
    FileFooter,
}

impl SectionType {
    /// On-disk code
    pub fn code(self) -> u32 {
        match self {
            SectionType::TableList => 2,
            SectionType::TableDescription => 3,
            SectionType::GcpEntry => 4,
            SectionType::FragmentHeader => 5,
            SectionType::FragmentFooter => 6,
            SectionType::FileFooter => 7,
        }
    }

    /// Decode an on-disk code
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            2 => SectionType::TableList,
            3 => SectionType::TableDescription,
            4 => SectionType::GcpEntry,
            5 => SectionType::FragmentHeader,
            6 => SectionType::FragmentFooter,
            7 => SectionType::FileFooter,
            _ => return None,
        })
    }
}

/// Backup file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic bytes: "CLBACKUP"
    pub magic: [u8; 8],
    /// Format version
    pub format_version: u32,
    /// Software version of the producing node
    pub producer_version: u32,
    /// File type code
    pub file_type: u32,
    /// Producing node
    pub node_id: u32,
    /// Backup identifier
    pub backup_id: u32,
    /// Byte-order marker bytes, in producer native order
    pub byte_order: [u8; 4],
}

impl FileHeader {
    /// Header a reader on this host expects for the given file
    pub fn expected(file_type: FileType, node_id: u32, backup_id: u32) -> Self {
        let mut byte_order = [0u8; 4];
        NativeEndian::write_u32(&mut byte_order, BYTE_ORDER_MARKER);
        FileHeader {
            magic: BACKUP_MAGIC,
            format_version: BACKUP_FORMAT_VERSION,
            producer_version: 0,
            file_type: file_type.code(),
            node_id,
            backup_id,
            byte_order,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        BigEndian::write_u32(&mut bytes[8..12], self.format_version);
        BigEndian::write_u32(&mut bytes[12..16], self.producer_version);
        BigEndian::write_u32(&mut bytes[16..20], self.file_type);
        BigEndian::write_u32(&mut bytes[20..24], self.node_id);
        BigEndian::write_u32(&mut bytes[24..28], self.backup_id);
        bytes[28..32].copy_from_slice(&self.byte_order);
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; FILE_HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        let mut byte_order = [0u8; 4];
        byte_order.copy_from_slice(&bytes[28..32]);
        FileHeader {
            magic,
            format_version: BigEndian::read_u32(&bytes[8..12]),
            producer_version: BigEndian::read_u32(&bytes[12..16]),
            file_type: BigEndian::read_u32(&bytes[16..20]),
            node_id: BigEndian::read_u32(&bytes[20..24]),
            backup_id: BigEndian::read_u32(&bytes[24..28]),
            byte_order,
        }
    }

    /// Byte-order marker interpreted in host order
    pub fn marker_in_host_order(&self) -> u32 {
        NativeEndian::read_u32(&self.byte_order)
    }

    /// Whether the magic matches
    pub fn is_valid(&self) -> bool {
        self.magic == BACKUP_MAGIC
    }
}

/// Encoded file footer
pub fn footer_bytes() -> [u8; FILE_FOOTER_SIZE] {
    let mut bytes = [0u8; FILE_FOOTER_SIZE];
    BigEndian::write_u32(&mut bytes[0..4], SectionType::FileFooter.code());
    BigEndian::write_u32(&mut bytes[4..8], 3);
    BigEndian::write_u32(&mut bytes[8..12], FILE_FOOTER_MARKER);
    bytes
}

/// Round a byte length up to whole 32-bit words
pub fn padded_len(bytes: usize) -> usize {
    (bytes + 3) & !3
}
