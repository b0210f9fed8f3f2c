//! Log entries
//!
//! A [`LogEntry`] is one operation recorded in the backup's log file. Unlike a
//! [`Tuple`](crate::Tuple) it only carries the attributes present in the
//! record: updates may carry any subset, deletes usually only the key.

use crate::attribute::{AttributeData, AttributeDesc};
use crate::table::TableSchema;
use std::fmt;

/// Operation recorded by a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEntryType {
    /// Row inserted
    Insert,
    /// Row deleted
    Delete,
    /// Row updated
    Update,
}

impl LogEntryType {
    /// Decode from the on-disk event code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(LogEntryType::Insert),
            2 => Some(LogEntryType::Delete),
            3 => Some(LogEntryType::Update),
            _ => None,
        }
    }

    /// On-disk event code
    pub fn code(self) -> u32 {
        match self {
            LogEntryType::Insert => 1,
            LogEntryType::Delete => 2,
            LogEntryType::Update => 3,
        }
    }
}

impl fmt::Display for LogEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntryType::Insert => write!(f, "INSERT"),
            LogEntryType::Delete => write!(f, "DELETE"),
            LogEntryType::Update => write!(f, "UPDATE"),
        }
    }
}

/// Descriptor/value pair carried by a log entry
#[derive(Debug, Clone)]
pub struct AttributeS<'a> {
    /// Attribute descriptor
    pub desc: &'a AttributeDesc,
    /// Decoded value
    pub data: AttributeData,
}

/// One logged operation
#[derive(Debug)]
pub struct LogEntry<'a> {
    entry_type: LogEntryType,
    table: &'a TableSchema,
    values: Vec<AttributeS<'a>>,
    /// Global checkpoint the operation committed in
    gci: u32,
    /// Ordinal of the record in the log file
    sequence: u64,
    spare: Vec<AttributeData>,
}

impl<'a> LogEntry<'a> {
    /// Empty entry
    pub fn new(entry_type: LogEntryType, table: &'a TableSchema, gci: u32, sequence: u64) -> Self {
        LogEntry {
            entry_type,
            table,
            values: Vec::new(),
            gci,
            sequence,
            spare: Vec::new(),
        }
    }

    /// Rebind the entry for the next record, keeping value storage for reuse
    pub fn reset(
        &mut self,
        entry_type: LogEntryType,
        table: &'a TableSchema,
        gci: u32,
        sequence: u64,
    ) {
        self.entry_type = entry_type;
        self.table = table;
        self.gci = gci;
        self.sequence = sequence;
        self.spare.extend(self.values.drain(..).map(|v| v.data));
    }

    /// Append a NULL value slot for `desc` and return it for filling
    pub fn push_value(&mut self, desc: &'a AttributeDesc) -> &mut AttributeData {
        let mut data = self
            .spare
            .pop()
            .unwrap_or_else(|| AttributeData::new(desc.kind()));
        data.reset(desc.kind());
        self.values.push(AttributeS { desc, data });
        let last = self.values.len() - 1;
        &mut self.values[last].data
    }

    /// Operation type
    pub fn entry_type(&self) -> LogEntryType {
        self.entry_type
    }

    /// Table the operation applies to
    pub fn table(&self) -> &'a TableSchema {
        self.table
    }

    /// Attribute values present in the record
    pub fn values(&self) -> &[AttributeS<'a>] {
        &self.values
    }

    /// Number of attribute values present
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Value for the attribute with identifier `attr_id`, if present
    pub fn value_of(&self, attr_id: u32) -> Option<&AttributeData> {
        self.values
            .iter()
            .find(|v| v.desc.attr_id() == attr_id)
            .map(|v| &v.data)
    }

    /// Global checkpoint identifier
    pub fn gci(&self) -> u32 {
        self.gci
    }

    /// Ordinal of the record in the log file
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Clone for LogEntry<'_> {
    fn clone(&self) -> Self {
        LogEntry {
            entry_type: self.entry_type,
            table: self.table,
            values: self.values.clone(),
            gci: self.gci,
            sequence: self.sequence,
            spare: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ColumnDef;
    use crate::kind::ElementKind;

    fn table() -> TableSchema {
        let mut t = TableSchema::new(5, "people", 1);
        t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        t.create_attr(ColumnDef::char("name", 20).nullable());
        t
    }

    #[test]
    fn test_type_codes() {
        for t in [LogEntryType::Insert, LogEntryType::Delete, LogEntryType::Update] {
            assert_eq!(LogEntryType::from_code(t.code()), Some(t));
        }
        assert_eq!(LogEntryType::from_code(0), None);
        assert_eq!(LogEntryType::Update.to_string(), "UPDATE");
    }

    #[test]
    fn test_push_and_lookup() {
        let t = table();
        let mut entry = LogEntry::new(LogEntryType::Insert, &t, 10, 0);
        entry.push_value(&t[0]).fill(&2i32.to_ne_bytes());
        entry.push_value(&t[1]).fill(b"carol");

        assert_eq!(entry.size(), 2);
        assert_eq!(entry.value_of(0).unwrap().value::<i32>(), Some(2));
        assert_eq!(entry.value_of(1).unwrap().as_str(), Some("carol"));
        assert!(entry.value_of(7).is_none());
    }

    #[test]
    fn test_reset_recycles_values() {
        let t = table();
        let mut entry = LogEntry::new(LogEntryType::Insert, &t, 10, 0);
        entry.push_value(&t[0]).fill(&2i32.to_ne_bytes());
        entry.push_value(&t[1]).fill(b"carol");

        entry.reset(LogEntryType::Update, &t, 11, 1);
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.entry_type(), LogEntryType::Update);
        assert_eq!(entry.gci(), 11);
        assert_eq!(entry.sequence(), 1);

        let data = entry.push_value(&t[1]);
        assert!(data.is_null());
        assert_eq!(data.kind(), ElementKind::Char);
    }

    #[test]
    fn test_clone_drops_spare_storage() {
        let t = table();
        let mut entry = LogEntry::new(LogEntryType::Delete, &t, 1, 0);
        entry.push_value(&t[0]).fill(&9i32.to_ne_bytes());
        let copy = entry.clone();
        entry.reset(LogEntryType::Insert, &t, 2, 1);
        assert_eq!(copy.size(), 1);
        assert_eq!(copy.entry_type(), LogEntryType::Delete);
        assert!(copy.spare.is_empty());
    }
}
