//! Materialized rows

use crate::attribute::{AttributeData, AttributeDesc};
use crate::table::TableSchema;

/// One row bound to its table schema
///
/// Holds exactly one [`AttributeData`] per attribute of the table, indexed by
/// attribute position. There is no implicit copy: retaining a row past the
/// iterator call that produced it requires an explicit `clone()`.
#[derive(Debug, Clone)]
pub struct Tuple<'a> {
    table: &'a TableSchema,
    all_attr_data: Vec<AttributeData>,
}

impl<'a> Tuple<'a> {
    /// Row for `table` with every attribute NULL
    pub fn new(table: &'a TableSchema) -> Self {
        let mut tuple = Tuple {
            table,
            all_attr_data: Vec::with_capacity(table.get_no_of_attributes()),
        };
        tuple.prepare_record(table);
        tuple
    }

    /// Rebind to `table`, resetting every value to NULL.
    ///
    /// Existing value storage is kept; slots are only added or dropped when
    /// the attribute count changes.
    pub fn prepare_record(&mut self, table: &'a TableSchema) {
        self.table = table;
        self.all_attr_data.truncate(table.get_no_of_attributes());
        for (data, desc) in self.all_attr_data.iter_mut().zip(table.attributes()) {
            data.reset(desc.kind());
        }
        let present = self.all_attr_data.len();
        self.all_attr_data.extend(
            table.attributes()[present..]
                .iter()
                .map(|desc| AttributeData::new(desc.kind())),
        );
    }

    /// Number of attributes
    pub fn get_no_of_attributes(&self) -> usize {
        self.all_attr_data.len()
    }

    /// Table this row belongs to
    pub fn get_table(&self) -> &'a TableSchema {
        self.table
    }

    /// Descriptor of attribute `i`
    pub fn get_desc(&self, i: usize) -> &'a AttributeDesc {
        &self.table.attributes()[i]
    }

    /// Value of attribute `i`
    pub fn get_data(&self, i: usize) -> &AttributeData {
        &self.all_attr_data[i]
    }

    /// Mutable value of attribute `i`
    pub fn get_data_mut(&mut self, i: usize) -> &mut AttributeData {
        &mut self.all_attr_data[i]
    }

    /// Value of the attribute named `name`
    pub fn get_by_name(&self, name: &str) -> Option<&AttributeData> {
        self.table
            .attributes()
            .iter()
            .position(|desc| desc.name() == name)
            .map(|i| &self.all_attr_data[i])
    }

    /// Descriptor/value pairs in attribute order
    pub fn iter(&self) -> impl Iterator<Item = (&'a AttributeDesc, &AttributeData)> + '_ {
        self.table.attributes().iter().zip(self.all_attr_data.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ColumnDef;
    use crate::kind::ElementKind;

    fn table_a() -> TableSchema {
        let mut t = TableSchema::new(1, "a", 1);
        t.create_attr(ColumnDef::new("id", ElementKind::Int32).primary_key());
        t.create_attr(ColumnDef::char("name", 8).nullable());
        t
    }

    fn table_b() -> TableSchema {
        let mut t = TableSchema::new(2, "b", 1);
        t.create_attr(ColumnDef::new("k", ElementKind::Uint64).primary_key());
        t.create_attr(ColumnDef::new("x", ElementKind::Int16));
        t.create_attr(ColumnDef::new("y", ElementKind::Int16));
        t
    }

    #[test]
    fn test_new_tuple_is_all_null() {
        let table = table_a();
        let tuple = Tuple::new(&table);
        assert_eq!(tuple.get_no_of_attributes(), 2);
        assert!(tuple.iter().all(|(_, d)| d.is_null()));
        assert_eq!(tuple.get_desc(1).name(), "name");
        assert_eq!(tuple.get_table().get_table_id(), 1);
    }

    #[test]
    fn test_prepare_record_resizes_on_table_switch() {
        let a = table_a();
        let b = table_b();
        let mut tuple = Tuple::new(&a);
        tuple.get_data_mut(0).fill(&5i32.to_ne_bytes());

        tuple.prepare_record(&b);
        assert_eq!(tuple.get_no_of_attributes(), 3);
        assert!(tuple.get_data(0).is_null());
        assert_eq!(tuple.get_data(0).kind(), ElementKind::Uint64);
        assert_eq!(tuple.get_data(2).kind(), ElementKind::Int16);

        tuple.prepare_record(&a);
        assert_eq!(tuple.get_no_of_attributes(), 2);
        assert_eq!(tuple.get_data(1).kind(), ElementKind::Char);
    }

    #[test]
    fn test_get_by_name() {
        let a = table_a();
        let mut tuple = Tuple::new(&a);
        tuple.get_data_mut(1).fill(b"zed     ");
        assert_eq!(tuple.get_by_name("name").unwrap().as_str(), Some("zed"));
        assert!(tuple.get_by_name("missing").is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let a = table_a();
        let mut tuple = Tuple::new(&a);
        tuple.get_data_mut(0).fill(&1i32.to_ne_bytes());
        let copy = tuple.clone();
        tuple.get_data_mut(0).fill(&2i32.to_ne_bytes());
        assert_eq!(copy.get_data(0).value::<i32>(), Some(1));
        assert_eq!(tuple.get_data(0).value::<i32>(), Some(2));
    }
}
