//! Testing utilities for backup readers
//!
//! Encoders that produce control, data and log files in the on-disk format,
//! so reader behavior can be exercised against files written in either byte
//! order. These write fixtures only; they are not a backup producer.
//!
//! # Example
//!
//! ```ignore
//! use restore_reader::testing::{BackupWriter, FieldValue};
//!
//! let writer = BackupWriter::new(dir.path(), 1, 1);
//! writer.control().table(people.clone()).gcp(10, 20).write()?;
//! writer
//!     .data()
//!     .fragment(&people, 0, &[vec![FieldValue::from(1i32), FieldValue::from("alice")]])
//!     .write(0)?;
//! ```

mod encoder;

pub use encoder::{
    encode_row, encode_table_descriptor, BackupWriter, ControlFile, DataFile, FieldValue,
    LogFile, ProducerOrder,
};
