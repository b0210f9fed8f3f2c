//! Control file loading
//!
//! [`RestoreMetaData`] decodes a node's control file into table schemas and
//! the backup's global checkpoint bounds. Loading walks the file in a fixed
//! order:
//!
//! ```text
//! header → TABLE_LIST → TABLE_DESCRIPTION × n → GCP_ENTRY → footer
//! ```
//!
//! Any deviation aborts the load; a partially read table list is never kept.
//! Once loaded the metadata is read-only and may be shared by data and log
//! iterators on different threads.

use crate::backup_file::BackupFile;
use crate::config::ReaderConfig;
use crate::descriptor::parse_table_descriptor;
use crate::format::{SectionType, GCP_ENTRY_WORDS};
use byteorder::{BigEndian, ByteOrder};
use restore_core::{RestoreError, RestoreResult, TableSchema};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Schema and checkpoint bounds of one node's backup
pub struct RestoreMetaData {
    file: BackupFile,
    config: ReaderConfig,
    tables: Vec<TableSchema>,
    /// Table id to position in `tables`
    table_index: HashMap<u32, usize>,
    start_gcp: u32,
    stop_gcp: u32,
    loaded: bool,
}

impl RestoreMetaData {
    /// Metadata for `node_id`'s control file of backup `backup_id` in `path`
    pub fn new(path: impl AsRef<Path>, node_id: u32, backup_id: u32) -> Self {
        Self::build(path.as_ref(), node_id, backup_id, ReaderConfig::default())
    }

    /// Like [`RestoreMetaData::new`] with an explicit reader configuration
    pub fn with_config(
        path: impl AsRef<Path>,
        node_id: u32,
        backup_id: u32,
        config: ReaderConfig,
    ) -> RestoreResult<Self> {
        config.validate()?;
        Ok(Self::build(path.as_ref(), node_id, backup_id, config))
    }

    fn build(path: &Path, node_id: u32, backup_id: u32, config: ReaderConfig) -> Self {
        let mut file = BackupFile::new(&config);
        file.set_ctl_file(node_id, backup_id, path);
        RestoreMetaData {
            file,
            config,
            tables: Vec::new(),
            table_index: HashMap::new(),
            start_gcp: 0,
            stop_gcp: 0,
            loaded: false,
        }
    }

    /// Read and decode the control file; returns the number of tables.
    ///
    /// The control file is closed again once loading finishes.
    pub fn load_content(&mut self) -> RestoreResult<usize> {
        if self.loaded {
            return Err(RestoreError::invalid_operation(
                "backup metadata already loaded",
            ));
        }

        let result = self.load_sections();
        self.file.close();
        let (tables, table_index, start_gcp, stop_gcp) = result?;

        self.tables = tables;
        self.table_index = table_index;
        self.start_gcp = start_gcp;
        self.stop_gcp = stop_gcp;
        self.loaded = true;

        info!(
            path = %self.file.get_filename().display(),
            tables = self.tables.len(),
            start_gcp,
            stop_gcp,
            "Loaded backup metadata"
        );
        Ok(self.tables.len())
    }

    #[allow(clippy::type_complexity)]
    fn load_sections(
        &mut self,
    ) -> RestoreResult<(Vec<TableSchema>, HashMap<u32, usize>, u32, u32)> {
        self.file.read_header()?;
        self.file.validate_footer()?;

        let table_ids = self.read_table_list()?;
        let mut tables = Vec::with_capacity(table_ids.len());
        let mut table_index = HashMap::with_capacity(table_ids.len());
        for (pos, &expected_id) in table_ids.iter().enumerate() {
            let mut table = self.read_table_description()?;
            if table.get_table_id() != expected_id {
                return Err(RestoreError::corrupt(
                    self.file.get_filename(),
                    self.file.offset(),
                    format!(
                        "descriptor for table {} where table list has {}",
                        table.get_table_id(),
                        expected_id
                    ),
                ));
            }
            if table_index.insert(expected_id, pos).is_some() {
                return Err(RestoreError::corrupt(
                    self.file.get_filename(),
                    self.file.offset(),
                    format!("table {} listed twice", expected_id),
                ));
            }
            table.set_backup_version(self.file.get_file_header().producer_version);
            table.set_pos(pos);
            debug!(
                table_id = expected_id,
                name = table.get_table_name(),
                attributes = table.get_no_of_attributes(),
                "Decoded table descriptor"
            );
            tables.push(table);
        }

        let (start_gcp, stop_gcp) = self.read_gcp_entry()?;

        let offset = self.file.offset();
        let code = self.file.read_word("file footer")?;
        if code != SectionType::FileFooter.code() {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!("expected file footer after GCP entry, found section type {}", code),
            ));
        }
        self.file.finish_footer_section()?;

        Ok((tables, table_index, start_gcp, stop_gcp))
    }

    fn read_table_list(&mut self) -> RestoreResult<Vec<u32>> {
        let len = self.file.read_section(SectionType::TableList)?;
        let ids = self.file.read_words(len - 2, "table list")?;
        Ok(ids.chunks_exact(4).map(BigEndian::read_u32).collect())
    }

    fn read_table_description(&mut self) -> RestoreResult<TableSchema> {
        let len = self.file.read_section(SectionType::TableDescription)?;
        let parsed = {
            let blob = self.file.read_words(len - 2, "table descriptor")?;
            parse_table_descriptor(blob)
        };
        parsed.map_err(|reason| RestoreError::invalid_descriptor(self.file.get_filename(), reason))
    }

    fn read_gcp_entry(&mut self) -> RestoreResult<(u32, u32)> {
        let offset = self.file.offset();
        let len = self.file.read_section(SectionType::GcpEntry)?;
        if len != GCP_ENTRY_WORDS {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!("GCP entry of {} words, expected {}", len, GCP_ENTRY_WORDS),
            ));
        }
        let start = self.file.read_word("start GCP")?;
        let stop = self.file.read_word("stop GCP")?;
        if start > stop {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!("start GCP {} is after stop GCP {}", start, stop),
            ));
        }
        Ok((start, stop))
    }

    /// Whether [`RestoreMetaData::load_content`] has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn ensure_loaded(&self) -> RestoreResult<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(RestoreError::MetadataNotLoaded)
        }
    }

    /// Number of tables in the backup
    pub fn get_no_of_tables(&self) -> usize {
        self.tables.len()
    }

    /// Table at position `i` in control-file order
    pub fn table(&self, i: usize) -> Option<&TableSchema> {
        self.tables.get(i)
    }

    /// Table with identifier `table_id`
    pub fn get_table(&self, table_id: u32) -> Option<&TableSchema> {
        self.table_index.get(&table_id).map(|&i| &self.tables[i])
    }

    /// All tables in control-file order
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Global checkpoint the backup started at
    pub fn get_start_gcp(&self) -> u32 {
        self.start_gcp
    }

    /// Global checkpoint the backup is consistent at
    pub fn get_stop_gcp(&self) -> u32 {
        self.stop_gcp
    }

    /// Reader configuration, inherited by iterators built on this metadata
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The control file
    pub fn file(&self) -> &BackupFile {
        &self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BackupWriter;
    use restore_core::{ColumnDef, ElementKind, RestoreErrorKind};

    fn table(id: u32, name: &str) -> TableSchema {
        let mut t = TableSchema::new(id, name, 1);
        t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        t.create_attr(ColumnDef::char("name", 20).nullable());
        t
    }

    #[test]
    fn test_load_tables_and_gcp() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BackupWriter::new(dir.path(), 5, 2).with_producer_version(0x0008_0001);
        writer
            .control()
            .table(table(10, "a"))
            .table(table(20, "b"))
            .gcp(100, 150)
            .write()
            .unwrap();

        let mut meta = RestoreMetaData::new(dir.path(), 2, 5);
        assert_eq!(meta.load_content().unwrap(), 2);
        assert!(meta.is_loaded());
        assert_eq!(meta.get_no_of_tables(), 2);
        assert_eq!(meta.get_start_gcp(), 100);
        assert_eq!(meta.get_stop_gcp(), 150);

        let b = meta.get_table(20).unwrap();
        assert_eq!(b.get_table_name(), "b");
        assert_eq!(b.pos(), 1);
        assert_eq!(b.get_backup_version(), 0x0008_0001);
        assert_eq!(meta.table(0).unwrap().get_table_id(), 10);
        assert!(meta.get_table(30).is_none());
        assert_eq!(meta.file().get_file_header().producer_version, 0x0008_0001);
    }

    #[test]
    fn test_load_twice_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        BackupWriter::new(dir.path(), 1, 1)
            .control()
            .table(table(1, "t"))
            .write()
            .unwrap();
        let mut meta = RestoreMetaData::new(dir.path(), 1, 1);
        meta.load_content().unwrap();
        assert_eq!(meta.load_content().unwrap_err().kind(), RestoreErrorKind::Usage);
    }

    #[test]
    fn test_wrong_backup_id_is_header_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BackupWriter::new(dir.path(), 7, 1);
        let bytes = writer.control().table(table(1, "t")).to_bytes();
        // written under the name backup 8 expects
        std::fs::write(dir.path().join("BACKUP-8.1.ctl"), bytes).unwrap();

        let mut meta = RestoreMetaData::new(dir.path(), 1, 8);
        let err = meta.load_content().unwrap_err();
        assert!(matches!(
            err,
            RestoreError::HeaderMismatch { field: "backup_id", expected: 8, found: 7, .. }
        ));
        assert!(!meta.is_loaded());
        assert_eq!(meta.get_no_of_tables(), 0);
    }

    #[test]
    fn test_start_after_stop_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        BackupWriter::new(dir.path(), 1, 1)
            .control()
            .table(table(1, "t"))
            .gcp(9, 3)
            .write()
            .unwrap();
        let mut meta = RestoreMetaData::new(dir.path(), 1, 1);
        assert_eq!(meta.load_content().unwrap_err().kind(), RestoreErrorKind::Format);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ReaderConfig::new().with_read_window_size(8);
        assert!(RestoreMetaData::with_config("/nonexistent", 1, 1, config).is_err());
    }
}
