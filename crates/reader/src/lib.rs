//! Backup file readers
//!
//! This crate decodes one node's share of a cluster backup:
//! - BackupFile: header/footer validation, byte-order detection and fix-up
//! - RestoreMetaData: control file → table schemas and checkpoint bounds
//! - RestoreDataIterator: data file → rows, fragment by fragment
//! - RestoreLogIterator: log file → insert/delete/update entries in commit order
//!
//! # Example
//!
//! ```ignore
//! use restore_reader::{FragmentStatus, RestoreDataIterator, RestoreMetaData};
//!
//! let mut meta = RestoreMetaData::new("/backups/BACKUP-1", node_id, 1);
//! meta.load_content()?;
//!
//! let mut data = RestoreDataIterator::new(&meta, None)?;
//! while let FragmentStatus::Available { .. } = data.read_fragment_header()? {
//!     while let Some(tuple) = data.get_next_tuple()? {
//!         sink.apply(tuple);
//!     }
//!     data.validate_fragment_footer()?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backup_file;
pub mod config;
pub mod data_iter;
mod decode;
mod descriptor;
pub mod format;
pub mod log_iter;
pub mod metadata;
pub mod paths;
pub mod testing;
mod window;

pub use backup_file::{BackupFile, WordOrder};
pub use config::ReaderConfig;
pub use data_iter::{FragmentStatus, ReleaseHook, RestoreDataIterator};
pub use format::{FileHeader, FileType};
pub use log_iter::RestoreLogIterator;
pub use metadata::RestoreMetaData;
pub use paths::BackupPaths;
