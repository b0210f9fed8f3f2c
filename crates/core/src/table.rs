//! Table schema
//!
//! A [`TableSchema`] is built once from a dictionary table description and is
//! immutable afterwards. It owns the attribute descriptors in backup-stream
//! order and keeps three position views over them:
//!
//! - fixed-width primary-key attributes
//! - fixed-width non-key attributes
//! - variable-width attributes
//!
//! The three views partition the attribute set: every attribute appears in
//! exactly one of them.

use crate::attribute::{AttributeDesc, ColumnDef};
use std::ops::Index;

/// Schema of one table in the backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table_id: u32,
    name: String,
    schema_version: u32,
    /// Software version of the node that produced the backup
    backup_version: u32,
    all_attributes: Vec<AttributeDesc>,
    fixed_keys: Vec<usize>,
    fixed_attribs: Vec<usize>,
    variable_attribs: Vec<usize>,
    no_of_nullable: u32,
    /// Slot in the owning metadata's table list
    pos: usize,
}

impl TableSchema {
    /// Empty schema; attributes are added with [`TableSchema::create_attr`]
    pub fn new(table_id: u32, name: impl Into<String>, schema_version: u32) -> Self {
        TableSchema {
            table_id,
            name: name.into(),
            schema_version,
            backup_version: 0,
            all_attributes: Vec::new(),
            fixed_keys: Vec::new(),
            fixed_attribs: Vec::new(),
            variable_attribs: Vec::new(),
            no_of_nullable: 0,
            pos: 0,
        }
    }

    /// Append an attribute.
    ///
    /// The attribute id is its ordinal position; nullable attributes take the
    /// next null-bitmap index.
    pub fn create_attr(&mut self, column: ColumnDef) -> &AttributeDesc {
        let position = self.all_attributes.len();
        let null_bit_index = if column.nullable {
            self.no_of_nullable += 1;
            Some(self.no_of_nullable - 1)
        } else {
            None
        };

        if column.variable {
            self.variable_attribs.push(position);
        } else if column.primary_key {
            self.fixed_keys.push(position);
        } else {
            self.fixed_attribs.push(position);
        }

        self.all_attributes
            .push(AttributeDesc::new(column, position as u32, null_bit_index));
        &self.all_attributes[position]
    }

    /// Table identifier
    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    /// Table name
    pub fn get_table_name(&self) -> &str {
        &self.name
    }

    /// Dictionary schema version
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Record the producing node's software version
    pub fn set_backup_version(&mut self, version: u32) {
        self.backup_version = version;
    }

    /// Producing node's software version
    pub fn get_backup_version(&self) -> u32 {
        self.backup_version
    }

    /// Slot index in the owning metadata
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Set the slot index in the owning metadata
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Number of attributes
    pub fn get_no_of_attributes(&self) -> usize {
        self.all_attributes.len()
    }

    /// Attribute at `position` in backup-stream order
    pub fn attribute(&self, position: usize) -> Option<&AttributeDesc> {
        self.all_attributes.get(position)
    }

    /// Position of the attribute with identifier `attr_id`
    pub fn attribute_position(&self, attr_id: u32) -> Option<usize> {
        let position = attr_id as usize;
        match self.all_attributes.get(position) {
            Some(desc) if desc.attr_id() == attr_id => Some(position),
            _ => self
                .all_attributes
                .iter()
                .position(|desc| desc.attr_id() == attr_id),
        }
    }

    /// All attributes in backup-stream order
    pub fn attributes(&self) -> &[AttributeDesc] {
        &self.all_attributes
    }

    /// Positions of fixed-width key attributes
    pub fn fixed_key_positions(&self) -> &[usize] {
        &self.fixed_keys
    }

    /// Positions of fixed-width non-key attributes
    pub fn fixed_attrib_positions(&self) -> &[usize] {
        &self.fixed_attribs
    }

    /// Positions of variable-width attributes
    pub fn variable_attrib_positions(&self) -> &[usize] {
        &self.variable_attribs
    }

    /// Fixed-width key attributes
    pub fn fixed_keys(&self) -> impl Iterator<Item = &AttributeDesc> + '_ {
        self.fixed_keys.iter().map(|&i| &self.all_attributes[i])
    }

    /// Fixed-width non-key attributes
    pub fn fixed_attribs(&self) -> impl Iterator<Item = &AttributeDesc> + '_ {
        self.fixed_attribs.iter().map(|&i| &self.all_attributes[i])
    }

    /// Variable-width attributes
    pub fn variable_attribs(&self) -> impl Iterator<Item = &AttributeDesc> + '_ {
        self.variable_attribs.iter().map(|&i| &self.all_attributes[i])
    }

    /// Whether any attribute is a primary-key component
    pub fn has_primary_key(&self) -> bool {
        self.all_attributes.iter().any(|a| a.is_primary_key())
    }

    /// Number of nullable attributes
    pub fn no_of_nullable(&self) -> u32 {
        self.no_of_nullable
    }

    /// Null bitmap size in 32-bit words
    pub fn null_bitmask_words(&self) -> u32 {
        (self.no_of_nullable + 31) / 32
    }

    /// Null bitmap size in bytes as stored (word aligned)
    pub fn null_bitmask_size(&self) -> usize {
        self.null_bitmask_words() as usize * 4
    }
}

impl Index<usize> for TableSchema {
    type Output = AttributeDesc;

    fn index(&self, position: usize) -> &AttributeDesc {
        &self.all_attributes[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ElementKind;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn sample() -> TableSchema {
        let mut table = TableSchema::new(12, "orders", 3);
        table.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        table.create_attr(ColumnDef::char("name", 20).nullable());
        table.create_attr(ColumnDef::new("region", ElementKind::Uint16).primary_key());
        table.create_attr(ColumnDef::varchar("note", 200).nullable());
        table.create_attr(ColumnDef::new("amount", ElementKind::Float64));
        table.create_attr(ColumnDef::varchar("tag", 16));
        table
    }

    #[test]
    fn test_attr_ids_follow_stream_order() {
        let table = sample();
        assert_eq!(table.get_no_of_attributes(), 6);
        for (i, attr) in table.attributes().iter().enumerate() {
            assert_eq!(attr.attr_id(), i as u32);
        }
        assert_eq!(table[3].name(), "note");
        assert_eq!(table.attribute_position(4), Some(4));
        assert_eq!(table.attribute_position(6), None);
    }

    #[test]
    fn test_null_bit_indexes_count_nullable_columns() {
        let table = sample();
        assert_eq!(table.no_of_nullable(), 2);
        assert_eq!(table[0].null_bit_index(), None);
        assert_eq!(table[1].null_bit_index(), Some(0));
        assert_eq!(table[3].null_bit_index(), Some(1));
        assert_eq!(table.null_bitmask_words(), 1);
        assert_eq!(table.null_bitmask_size(), 4);
    }

    #[test]
    fn test_partitions() {
        let table = sample();
        assert_eq!(table.fixed_key_positions(), &[0, 2]);
        assert_eq!(table.fixed_attrib_positions(), &[1, 4]);
        assert_eq!(table.variable_attrib_positions(), &[3, 5]);

        let names: Vec<&str> = table.fixed_keys().map(|a| a.name()).collect();
        assert_eq!(names, vec!["id", "region"]);
    }

    #[test]
    fn test_partitions_cover_without_overlap() {
        let table = sample();
        let mut seen = BTreeSet::new();
        for &p in table
            .fixed_key_positions()
            .iter()
            .chain(table.fixed_attrib_positions())
            .chain(table.variable_attrib_positions())
        {
            assert!(seen.insert(p), "position {} in two partitions", p);
        }
        assert_eq!(seen.len(), table.get_no_of_attributes());
    }

    #[test]
    fn test_no_nullable_means_empty_bitmap() {
        let mut table = TableSchema::new(1, "t", 1);
        table.create_attr(ColumnDef::new("k", ElementKind::Uint64).primary_key());
        assert_eq!(table.null_bitmask_words(), 0);
        assert_eq!(table.null_bitmask_size(), 0);
        assert!(table.has_primary_key());
    }

    #[test]
    fn test_bitmap_grows_past_one_word() {
        let mut table = TableSchema::new(1, "wide", 1);
        table.create_attr(ColumnDef::new("k", ElementKind::Uint32).primary_key());
        for i in 0..33 {
            table.create_attr(ColumnDef::new(format!("c{}", i), ElementKind::Int8).nullable());
        }
        assert_eq!(table.no_of_nullable(), 33);
        assert_eq!(table.null_bitmask_words(), 2);
        assert_eq!(table[33].null_bit_index(), Some(32));
    }

    #[test]
    fn test_versions() {
        let mut table = sample();
        assert_eq!(table.schema_version(), 3);
        table.set_backup_version(0x0005_0100);
        assert_eq!(table.get_backup_version(), 0x0005_0100);
        table.set_pos(4);
        assert_eq!(table.pos(), 4);
        assert_eq!(table.get_table_name(), "orders");
        assert_eq!(table.get_table_id(), 12);
    }

    proptest! {
        #[test]
        fn prop_partitions_and_null_bits(
            flags in proptest::collection::vec(any::<(bool, bool, bool)>(), 1..80)
        ) {
            let mut table = TableSchema::new(1, "generated", 1);
            for (i, &(key, nullable, variable)) in flags.iter().enumerate() {
                let mut column =
                    ColumnDef::new(format!("c{}", i), ElementKind::Uint8).with_array_size(4);
                if key {
                    column = column.primary_key();
                } else if nullable {
                    column = column.nullable();
                }
                if variable {
                    column = column.variable();
                }
                table.create_attr(column);
            }

            let placed = table.fixed_key_positions().len()
                + table.fixed_attrib_positions().len()
                + table.variable_attrib_positions().len();
            prop_assert_eq!(placed, flags.len());

            let bits: Vec<u32> = table
                .attributes()
                .iter()
                .filter_map(|a| a.null_bit_index())
                .collect();
            let expected: Vec<u32> = (0..table.no_of_nullable()).collect();
            prop_assert_eq!(bits, expected);
            prop_assert!(table.null_bitmask_words() * 32 >= table.no_of_nullable());
            prop_assert!(table.null_bitmask_words() * 32 < table.no_of_nullable() + 32);
        }
    }
}
