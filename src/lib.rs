//! Backup restore - reads one node's share of a cluster backup
//!
//! A backup directory holds, per node, a control file (table schemas and the
//! checkpoint interval), one or more data files (table rows grouped in
//! fragments) and a log file (changes committed while the backup ran).
//!
//! # Quick Start
//!
//! ```ignore
//! use backup_restore::{FragmentStatus, RestoreDataIterator, RestoreLogIterator, RestoreMetaData};
//!
//! let mut meta = RestoreMetaData::new("/backups/BACKUP-7", 3, 7);
//! meta.load_content()?;
//!
//! let mut data = RestoreDataIterator::new(&meta, None)?;
//! while let FragmentStatus::Available { .. } = data.read_fragment_header()? {
//!     while let Some(tuple) = data.get_next_tuple()? {
//!         println!("{} attributes", tuple.get_no_of_attributes());
//!     }
//!     data.validate_fragment_footer()?;
//! }
//!
//! let mut log = RestoreLogIterator::new(&meta)?;
//! while let Some(entry) = log.get_next_log_entry()? {
//!     println!("{} at gci {}", entry.entry_type(), entry.gci());
//! }
//! ```
//!
//! # Architecture
//!
//! The schema model and error taxonomy live in `restore-core`; file framing
//! and the three readers live in `restore-reader`. Both are re-exported here.

pub use restore_core::*;
pub use restore_reader::{
    format, paths, testing, BackupFile, BackupPaths, FileHeader, FileType, FragmentStatus,
    ReaderConfig, ReleaseHook, RestoreDataIterator, RestoreLogIterator, RestoreMetaData,
    WordOrder,
};
