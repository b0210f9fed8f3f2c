//! Shared file framing for control, data and log files.
//!
//! [`BackupFile`] owns the open file and its read-ahead window, validates the
//! file header against the header the restore session expects, checks the
//! trailing footer, and fixes up attribute byte order when the producing node
//! and this host disagree.

use crate::config::ReaderConfig;
use crate::format::{
    footer_bytes, FileHeader, FileType, SectionType, BACKUP_MAGIC, BYTE_ORDER_MARKER,
    FILE_FOOTER_MARKER, FILE_FOOTER_SIZE, FILE_HEADER_SIZE,
};
use crate::paths::BackupPaths;
use crate::window::ReadWindow;
use byteorder::{BigEndian, ByteOrder};
use restore_core::{AttributeData, AttributeDesc, RestoreError, RestoreResult};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Byte order of attribute payloads relative to this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordOrder {
    host_byte_order: bool,
}

impl WordOrder {
    /// Payloads already in host order
    pub fn host() -> Self {
        WordOrder {
            host_byte_order: true,
        }
    }

    /// Payloads in the reverse of host order
    pub fn swapped() -> Self {
        WordOrder {
            host_byte_order: false,
        }
    }

    /// Whether payloads are in host order
    pub fn matches_host(self) -> bool {
        self.host_byte_order
    }

    /// Reverse the bytes of each element of `data` when orders differ.
    ///
    /// `array_size` overrides the descriptor's element count, for
    /// variable-width values. Character and 8-bit elements are never swapped.
    /// Returns `false` if the value holds fewer bytes than the element count
    /// requires.
    pub fn twiddle(
        self,
        desc: &AttributeDesc,
        data: &mut AttributeData,
        array_size: Option<u32>,
    ) -> bool {
        let width = desc.kind().width();
        let count = array_size.unwrap_or_else(|| desc.array_size()) as usize;
        let bytes = data.raw_mut();
        let needed = match count.checked_mul(width) {
            Some(n) if n <= bytes.len() => n,
            _ => return false,
        };
        if self.host_byte_order || width == 1 {
            return true;
        }
        for element in bytes[..needed].chunks_exact_mut(width) {
            element.reverse();
        }
        true
    }
}

/// Open backup file with validated framing
pub struct BackupFile {
    window: ReadWindow,
    /// Backup directory
    path: PathBuf,
    /// Full path of the file
    file_name: PathBuf,
    host_byte_order: bool,
    file_header: FileHeader,
    expected_file_header: FileHeader,
    node_id: u32,
    max_record_words: u32,
}

impl BackupFile {
    pub(crate) fn new(config: &ReaderConfig) -> Self {
        BackupFile {
            window: ReadWindow::new(config.read_window_size),
            path: PathBuf::new(),
            file_name: PathBuf::new(),
            host_byte_order: true,
            file_header: FileHeader::expected(FileType::Control, 0, 0),
            expected_file_header: FileHeader::expected(FileType::Control, 0, 0),
            node_id: 0,
            max_record_words: config.max_record_words,
        }
    }

    /// Target the control file of `node_id` for backup `backup_id` in `path`
    pub(crate) fn set_ctl_file(&mut self, node_id: u32, backup_id: u32, path: &Path) {
        self.node_id = node_id;
        self.expected_file_header = FileHeader::expected(FileType::Control, node_id, backup_id);
        let name = BackupPaths::new(path, backup_id, node_id).ctl_file_name();
        self.set_name(path, &name);
    }

    /// Target data file `no` of the backup `bf` was read from
    pub(crate) fn set_data_file(&mut self, bf: &BackupFile, no: u32) {
        self.inherit_expected(bf, FileType::Data);
        let name = bf.paths().data_file_name(no);
        self.set_name(&bf.path, &name);
    }

    /// Target the log file of the backup `bf` was read from
    pub(crate) fn set_log_file(&mut self, bf: &BackupFile) {
        self.inherit_expected(bf, FileType::Log);
        let name = bf.paths().log_file_name();
        self.set_name(&bf.path, &name);
    }

    fn inherit_expected(&mut self, bf: &BackupFile, file_type: FileType) {
        self.node_id = bf.node_id;
        let mut expected = FileHeader::expected(file_type, bf.node_id, bf.file_header.backup_id);
        expected.producer_version = bf.file_header.producer_version;
        self.expected_file_header = expected;
    }

    fn paths(&self) -> BackupPaths {
        BackupPaths::new(&self.path, self.expected_file_header.backup_id, self.node_id)
    }

    fn set_name(&mut self, path: &Path, name: &str) {
        self.path = path.to_path_buf();
        self.file_name = path.join(name);
    }

    /// Open the target file for reading
    pub fn open_file(&mut self) -> RestoreResult<()> {
        let file =
            File::open(&self.file_name).map_err(|e| RestoreError::io(&self.file_name, e))?;
        self.window.attach(file);
        debug!(path = %self.file_name.display(), "Opened backup file");
        Ok(())
    }

    /// Close the file, keeping the decoded header
    pub(crate) fn close(&mut self) {
        self.window.detach();
    }

    /// Read and validate the file header, opening the file if needed.
    ///
    /// Checks magic, format version, file type, node, backup and (for data
    /// and log files) producer version, then records whether attribute
    /// payloads are in host byte order.
    pub fn read_header(&mut self) -> RestoreResult<()> {
        if !self.window.is_attached() {
            self.open_file()?;
        }

        let mut raw = [0u8; FILE_HEADER_SIZE];
        let read = self
            .window
            .fread_buffer(&mut raw, 1)
            .map_err(|e| RestoreError::io(&self.file_name, e))?;
        if read < FILE_HEADER_SIZE {
            return Err(RestoreError::truncated(
                &self.file_name,
                read as u64,
                format!("file header needs {} bytes", FILE_HEADER_SIZE),
            ));
        }

        let header = FileHeader::from_bytes(&raw);
        if !header.is_valid() {
            return Err(RestoreError::BadMagic {
                path: self.file_name.clone(),
                expected: BACKUP_MAGIC,
                found: header.magic,
            });
        }

        let expected = self.expected_file_header;
        self.check_field("format_version", expected.format_version, header.format_version)?;
        self.check_field("file_type", expected.file_type, header.file_type)?;
        self.check_field("node_id", expected.node_id, header.node_id)?;
        self.check_field("backup_id", expected.backup_id, header.backup_id)?;
        if expected.producer_version != 0 {
            self.check_field(
                "producer_version",
                expected.producer_version,
                header.producer_version,
            )?;
        }

        let marker = header.marker_in_host_order();
        self.host_byte_order = if marker == BYTE_ORDER_MARKER {
            true
        } else if marker == BYTE_ORDER_MARKER.swap_bytes() {
            false
        } else {
            return Err(RestoreError::BadByteOrder {
                path: self.file_name.clone(),
                marker,
            });
        };

        self.file_header = header;
        debug!(
            path = %self.file_name.display(),
            backup_id = header.backup_id,
            node_id = header.node_id,
            producer_version = header.producer_version,
            host_byte_order = self.host_byte_order,
            "Validated backup file header"
        );
        Ok(())
    }

    fn check_field(&self, field: &'static str, expected: u32, found: u32) -> RestoreResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(RestoreError::HeaderMismatch {
                path: self.file_name.clone(),
                field,
                expected,
                found,
            })
        }
    }

    /// Check the trailing footer without moving the read position
    pub fn validate_footer(&mut self) -> RestoreResult<()> {
        let tail = self
            .window
            .read_tail(FILE_FOOTER_SIZE)
            .map_err(|e| RestoreError::io(&self.file_name, e))?;
        match tail {
            Some(bytes) if bytes[..] == footer_bytes()[..] => Ok(()),
            _ => {
                warn!(path = %self.file_name.display(), "Backup file footer missing or corrupt");
                Err(RestoreError::BadFooter {
                    path: self.file_name.clone(),
                })
            }
        }
    }

    /// Fix up the byte order of `data` in place; see [`WordOrder::twiddle`]
    pub fn twiddle(
        &self,
        desc: &AttributeDesc,
        data: &mut AttributeData,
        array_size: Option<u32>,
    ) -> RestoreResult<()> {
        if self.word_order().twiddle(desc, data, array_size) {
            Ok(())
        } else {
            Err(RestoreError::corrupt(
                &self.file_name,
                self.offset(),
                format!(
                    "value of attribute '{}' holds {} bytes, fewer than its element count requires",
                    desc.name(),
                    data.raw().len()
                ),
            ))
        }
    }

    /// Byte-order fix-up for this file's payloads
    pub fn word_order(&self) -> WordOrder {
        WordOrder {
            host_byte_order: self.host_byte_order,
        }
    }

    /// Grow the read-ahead window to at least `bytes`
    pub(crate) fn create_buffer(&mut self, bytes: usize) {
        let before = self.window.buffer_size();
        self.window.create_buffer(bytes);
        if self.window.buffer_size() != before {
            trace!(
                path = %self.file_name.display(),
                size = self.window.buffer_size(),
                "Grew read window"
            );
        }
    }

    /// Read one big-endian framing word
    pub(crate) fn read_word(&mut self, what: &str) -> RestoreResult<u32> {
        let offset = self.window.consumed();
        let bytes = self
            .window
            .get_buffer_ptr(4, 1)
            .map_err(|e| RestoreError::io(&self.file_name, e))?;
        if bytes.len() < 4 {
            return Err(RestoreError::truncated(
                &self.file_name,
                offset,
                format!("end of file reading {}", what),
            ));
        }
        Ok(BigEndian::read_u32(bytes))
    }

    /// Read `words` whole words, served from the read-ahead window
    pub(crate) fn read_words(&mut self, words: u32, what: &str) -> RestoreResult<&[u8]> {
        let offset = self.window.consumed();
        if words > self.max_record_words {
            return Err(RestoreError::corrupt(
                &self.file_name,
                offset,
                format!(
                    "{} length of {} words exceeds limit of {}",
                    what, words, self.max_record_words
                ),
            ));
        }
        let bytes = self
            .window
            .get_buffer_ptr(4, words as usize)
            .map_err(|e| RestoreError::io(&self.file_name, e))?;
        if bytes.len() < words as usize * 4 {
            return Err(RestoreError::truncated(
                &self.file_name,
                offset,
                format!(
                    "{} needs {} bytes, {} available",
                    what,
                    words as usize * 4,
                    bytes.len()
                ),
            ));
        }
        Ok(bytes)
    }

    /// Read a section's type and length words, checking the type
    pub(crate) fn read_section(&mut self, expected: SectionType) -> RestoreResult<u32> {
        let offset = self.offset();
        let code = self.read_word("section type")?;
        if code != expected.code() {
            return Err(RestoreError::corrupt(
                &self.file_name,
                offset,
                format!("expected {:?} section, found type {}", expected, code),
            ));
        }
        self.read_section_length(expected)
    }

    /// Read the length word of a section whose type was already consumed
    pub(crate) fn read_section_length(&mut self, section: SectionType) -> RestoreResult<u32> {
        let offset = self.offset();
        let len = self.read_word("section length")?;
        if len < 2 {
            return Err(RestoreError::corrupt(
                &self.file_name,
                offset,
                format!("{:?} section length {} is shorter than its framing", section, len),
            ));
        }
        Ok(len)
    }

    /// Consume the remainder of a footer section whose type was already read
    pub(crate) fn finish_footer_section(&mut self) -> RestoreResult<()> {
        let offset = self.offset();
        let len = self.read_word("footer length")?;
        let marker = self.read_word("footer marker")?;
        if len != 3 || marker != FILE_FOOTER_MARKER {
            return Err(RestoreError::corrupt(
                &self.file_name,
                offset,
                format!("malformed file footer (length {}, marker {:#010x})", len, marker),
            ));
        }
        Ok(())
    }

    /// Bytes consumed from the start of the file
    pub fn offset(&self) -> u64 {
        self.window.consumed()
    }

    /// Whether reading `bytes` more will recycle window memory
    pub(crate) fn will_discard(&self, bytes: usize) -> bool {
        self.window.will_discard(bytes)
    }

    /// Backup directory
    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Full path of the file
    pub fn get_filename(&self) -> &Path {
        &self.file_name
    }

    /// Node whose backup this file belongs to
    pub fn get_node_id(&self) -> u32 {
        self.node_id
    }

    /// Header as read from the file
    pub fn get_file_header(&self) -> &FileHeader {
        &self.file_header
    }

    /// Whether attribute payloads are in host byte order
    pub fn host_byte_order(&self) -> bool {
        self.host_byte_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restore_core::{ColumnDef, ElementKind, TableSchema};

    fn table() -> TableSchema {
        let mut t = TableSchema::new(1, "t", 1);
        t.create_attr(ColumnDef::new("a", ElementKind::Uint32).with_array_size(2));
        t.create_attr(ColumnDef::char("s", 4));
        t.create_attr(ColumnDef::new("w", ElementKind::Int16).with_array_size(8).variable());
        t
    }

    fn filled(kind: ElementKind, bytes: &[u8]) -> AttributeData {
        let mut data = AttributeData::new(kind);
        data.fill(bytes);
        data
    }

    #[test]
    fn test_twiddle_host_order_is_noop() {
        let t = table();
        let mut data = filled(ElementKind::Uint32, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(WordOrder::host().twiddle(&t[0], &mut data, None));
        assert_eq!(data.raw(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_twiddle_swaps_each_element() {
        let t = table();
        let mut data = filled(ElementKind::Uint32, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(WordOrder::swapped().twiddle(&t[0], &mut data, None));
        assert_eq!(data.raw(), &[4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn test_twiddle_leaves_characters_alone() {
        let t = table();
        let mut data = filled(ElementKind::Char, b"abcd");
        assert!(WordOrder::swapped().twiddle(&t[1], &mut data, None));
        assert_eq!(data.raw(), b"abcd");
    }

    #[test]
    fn test_twiddle_array_size_override() {
        let t = table();
        let mut data = filled(ElementKind::Int16, &[1, 2, 3, 4]);
        assert!(WordOrder::swapped().twiddle(&t[2], &mut data, Some(2)));
        assert_eq!(data.raw(), &[2, 1, 4, 3]);
    }

    #[test]
    fn test_twiddle_rejects_short_value() {
        let t = table();
        let mut data = filled(ElementKind::Uint32, &[1, 2, 3, 4]);
        assert!(!WordOrder::swapped().twiddle(&t[0], &mut data, None));
        assert!(!WordOrder::host().twiddle(&t[0], &mut data, None));
    }

    #[test]
    fn test_ctl_file_naming() {
        let mut bf = BackupFile::new(&ReaderConfig::default());
        bf.set_ctl_file(2, 9, Path::new("/backups/BACKUP-9"));
        assert_eq!(
            bf.get_filename(),
            Path::new("/backups/BACKUP-9/BACKUP-9.2.ctl")
        );
        assert_eq!(bf.get_path(), Path::new("/backups/BACKUP-9"));
        assert_eq!(bf.get_node_id(), 2);
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bf = BackupFile::new(&ReaderConfig::default());
        bf.set_ctl_file(1, 1, dir.path());
        let err = bf.read_header().unwrap_err();
        assert_eq!(err.kind(), restore_core::RestoreErrorKind::Io);
    }
}
