//! Backup file naming
//!
//! Each node writes one file triplet per backup into the backup directory:
//!
//! ```text
//! backup-dir/
//! ├── BACKUP-<backup>.<node>.ctl      # control file: schema + GCP bounds
//! ├── BACKUP-<backup>-<n>.<node>.Data # data file n
//! └── BACKUP-<backup>.<node>.log      # log file
//! ```

use std::path::{Path, PathBuf};

/// Paths of one node's files within a backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    dir: PathBuf,
    backup_id: u32,
    node_id: u32,
}

impl BackupPaths {
    /// Paths for `node_id`'s share of backup `backup_id` under `dir`
    pub fn new(dir: impl AsRef<Path>, backup_id: u32, node_id: u32) -> Self {
        BackupPaths {
            dir: dir.as_ref().to_path_buf(),
            backup_id,
            node_id,
        }
    }

    /// Backup directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Backup identifier
    pub fn backup_id(&self) -> u32 {
        self.backup_id
    }

    /// Node identifier
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Control file name
    pub fn ctl_file_name(&self) -> String {
        format!("BACKUP-{}.{}.ctl", self.backup_id, self.node_id)
    }

    /// Data file name for data file `no`
    pub fn data_file_name(&self, no: u32) -> String {
        format!("BACKUP-{}-{}.{}.Data", self.backup_id, no, self.node_id)
    }

    /// Log file name
    pub fn log_file_name(&self) -> String {
        format!("BACKUP-{}.{}.log", self.backup_id, self.node_id)
    }

    /// Control file path
    pub fn ctl_file(&self) -> PathBuf {
        self.dir.join(self.ctl_file_name())
    }

    /// Data file path for data file `no`
    pub fn data_file(&self, no: u32) -> PathBuf {
        self.dir.join(self.data_file_name(no))
    }

    /// Log file path
    pub fn log_file(&self) -> PathBuf {
        self.dir.join(self.log_file_name())
    }
}
