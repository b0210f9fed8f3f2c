//! Core types for backup restore
//!
//! This crate defines the schema and value model shared by the backup readers:
//! - ElementKind / Scalar: element types and tagged element values
//! - ColumnDef / AttributeDesc: column metadata and per-table attribute descriptors
//! - AttributeData: decoded per-row attribute value
//! - TableSchema: attribute set partitioned into fixed-key, fixed and variable groups
//! - Tuple: one row bound to a table
//! - LogEntry / AttributeS: one logged insert, delete or update
//! - RestoreError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod error;
pub mod kind;
pub mod log_entry;
pub mod table;
pub mod tuple;

pub use attribute::{AttributeData, AttributeDesc, ColumnDef};
pub use error::{RestoreError, RestoreErrorKind, RestoreResult};
pub use kind::{Element, ElementKind, Scalar};
pub use log_entry::{AttributeS, LogEntry, LogEntryType};
pub use table::TableSchema;
pub use tuple::Tuple;
