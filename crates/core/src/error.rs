//! Error types for backup restore
//!
//! Every failure a restore session can hit is one variant of [`RestoreError`].
//! Variants are grouped into a small taxonomy ([`RestoreErrorKind`]) so that a
//! caller orchestrating a restore can decide what to report without matching on
//! every variant. Nothing in this workspace retries: backup files are static
//! artifacts, so a failed read cannot succeed the second time.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for restore operations
pub type RestoreResult<T> = std::result::Result<T, RestoreError>;

/// Coarse classification of a [`RestoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreErrorKind {
    /// File missing or unreadable
    Io,
    /// Bad magic, version mismatch, bad byte-order marker, malformed section
    Format,
    /// Missing footer or a record cut short by end-of-file
    Truncation,
    /// Data or log file references schema absent from the loaded metadata
    SchemaConsistency,
    /// Invalid configuration or an operation issued in the wrong state
    Usage,
}

/// Error types for reading backup files
#[derive(Debug, Error)]
pub enum RestoreError {
    /// I/O error opening or reading a backup file
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// File does not start with the backup magic
    #[error("Bad magic in {path}: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// File being read
        path: PathBuf,
        /// Magic this reader understands
        expected: [u8; 8],
        /// Bytes found at the start of the file
        found: [u8; 8],
    },

    /// A header field disagrees with what the restore session expects
    #[error("Header mismatch in {path}: {field} expected {expected}, found {found}")]
    HeaderMismatch {
        /// File being read
        path: PathBuf,
        /// Name of the header field
        field: &'static str,
        /// Expected value
        expected: u32,
        /// Value found in the file
        found: u32,
    },

    /// Byte-order marker is neither host order nor its reverse
    #[error("Unrecognized byte-order marker {marker:#010x} in {path}")]
    BadByteOrder {
        /// File being read
        path: PathBuf,
        /// Marker as read in host order
        marker: u32,
    },

    /// Structurally invalid section or record
    #[error("Corrupt {path} at byte {offset}: {reason}")]
    Corrupt {
        /// File being read
        path: PathBuf,
        /// Byte offset where the problem was detected
        offset: u64,
        /// Description of the problem
        reason: String,
    },

    /// Table descriptor in the control file could not be decoded
    #[error("Invalid table descriptor in {path}: {reason}")]
    InvalidDescriptor {
        /// Control file being read
        path: PathBuf,
        /// Description of the problem
        reason: String,
    },

    /// File ended before a complete record or section was read
    #[error("Truncated {path} at byte {offset}: {reason}")]
    Truncated {
        /// File being read
        path: PathBuf,
        /// Byte offset where input ran out
        offset: u64,
        /// What was being read
        reason: String,
    },

    /// Trailing file footer absent or corrupt
    #[error("Missing or invalid footer in {path}")]
    BadFooter {
        /// File being read
        path: PathBuf,
    },

    /// Table identifier not present in the loaded metadata
    #[error("Table {table_id} not found in backup metadata")]
    TableNotFound {
        /// Identifier referenced by the data or log file
        table_id: u32,
    },

    /// Attribute identifier not present in its table
    #[error("Attribute {attr_id} not found in table {table_id}")]
    AttributeNotFound {
        /// Table the record belongs to
        table_id: u32,
        /// Attribute identifier referenced by the record
        attr_id: u32,
    },

    /// Iterator created over metadata that has not been loaded
    #[error("Backup metadata has not been loaded")]
    MetadataNotLoaded,

    /// Operation called out of sequence
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Reader configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RestoreError {
    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a corruption error
    pub fn corrupt(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Create a truncation error
    pub fn truncated(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        Self::Truncated {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> RestoreErrorKind {
        match self {
            RestoreError::Io { .. } => RestoreErrorKind::Io,
            RestoreError::BadMagic { .. }
            | RestoreError::HeaderMismatch { .. }
            | RestoreError::BadByteOrder { .. }
            | RestoreError::Corrupt { .. }
            | RestoreError::InvalidDescriptor { .. } => RestoreErrorKind::Format,
            RestoreError::Truncated { .. } | RestoreError::BadFooter { .. } => {
                RestoreErrorKind::Truncation
            }
            RestoreError::TableNotFound { .. }
            | RestoreError::AttributeNotFound { .. }
            | RestoreError::MetadataNotLoaded => RestoreErrorKind::SchemaConsistency,
            RestoreError::InvalidOperation(_) | RestoreError::Config(_) => RestoreErrorKind::Usage,
        }
    }
}
