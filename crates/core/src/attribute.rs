//! Attribute descriptors and decoded attribute values
//!
//! [`AttributeDesc`] is the static description of one column as recorded in
//! the backup's dictionary metadata. [`AttributeData`] is the per-row value
//! slot a decoder fills in; it keeps its storage across rows so that decoding
//! a stream of rows does not allocate per field.

use crate::kind::{Element, ElementKind, Scalar};
use serde::{Deserialize, Serialize};

/// Column metadata as recorded in the backup dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Element type
    pub kind: ElementKind,
    /// Element count (maximum element count for variable-width columns)
    pub array_size: u32,
    /// Component of the primary key
    pub primary_key: bool,
    /// May hold NULL
    pub nullable: bool,
    /// Stored length-prefixed rather than at a fixed width
    pub variable: bool,
}

impl ColumnDef {
    /// Non-null scalar column
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        ColumnDef {
            name: name.into(),
            kind,
            array_size: 1,
            primary_key: false,
            nullable: false,
            variable: false,
        }
    }

    /// Fixed-width character column of `len` bytes
    pub fn char(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, ElementKind::Char).with_array_size(len)
    }

    /// Variable-width character column of at most `max_len` bytes
    pub fn varchar(name: impl Into<String>, max_len: u32) -> Self {
        Self::char(name, max_len).variable()
    }

    /// Set element count (builder pattern)
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    /// Mark as primary-key component (builder pattern)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as nullable (builder pattern)
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as variable width (builder pattern)
    pub fn variable(mut self) -> Self {
        self.variable = true;
        self
    }
}

/// Immutable description of one attribute of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDesc {
    /// Element width in bits
    size: u32,
    array_size: u32,
    /// Ordinal position in the backup stream
    attr_id: u32,
    column: ColumnDef,
    null_bit_index: Option<u32>,
}

impl AttributeDesc {
    pub(crate) fn new(column: ColumnDef, attr_id: u32, null_bit_index: Option<u32>) -> Self {
        AttributeDesc {
            size: column.kind.size_in_bits(),
            array_size: column.array_size,
            attr_id,
            column,
            null_bit_index,
        }
    }

    /// Element width in bits
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Element count (maximum count for variable-width attributes)
    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    /// Identifier of this attribute in data and log records
    pub fn attr_id(&self) -> u32 {
        self.attr_id
    }

    /// Originating column metadata
    pub fn column(&self) -> &ColumnDef {
        &self.column
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// Element kind
    pub fn kind(&self) -> ElementKind {
        self.column.kind
    }

    /// Position in the row null bitmap; `None` for non-nullable attributes
    pub fn null_bit_index(&self) -> Option<u32> {
        self.null_bit_index
    }

    /// Whether the attribute may be NULL
    pub fn is_nullable(&self) -> bool {
        self.column.nullable
    }

    /// Whether the attribute is a primary-key component
    pub fn is_primary_key(&self) -> bool {
        self.column.primary_key
    }

    /// Whether the attribute is stored length-prefixed
    pub fn is_variable(&self) -> bool {
        self.column.variable
    }

    /// Storage footprint in 32-bit words: `ceil(size * array_size / 32)`.
    ///
    /// Computed and returned in 64-bit arithmetic so the result neither
    /// truncates nor depends on the platform word size.
    pub fn get_size_in_words(&self) -> u64 {
        (self.size as u64 * self.array_size as u64 + 31) / 32
    }

    /// Value length in bytes at full array size
    pub fn get_size_in_bytes(&self) -> usize {
        ((self.size as u64 * self.array_size as u64 + 7) / 8) as usize
    }
}

/// Decoded value of one attribute in one row
///
/// The storage holds host-order element bytes. Typed accessors check the
/// requested type against the attribute's element kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    null: bool,
    /// Byte length actually present
    size: u32,
    kind: ElementKind,
    storage: Vec<u8>,
}

impl AttributeData {
    /// Empty (NULL) slot for elements of `kind`
    pub fn new(kind: ElementKind) -> Self {
        AttributeData {
            null: true,
            size: 0,
            kind,
            storage: Vec::new(),
        }
    }

    /// Re-target the slot at a different kind and mark it NULL, keeping storage
    pub fn reset(&mut self, kind: ElementKind) {
        self.kind = kind;
        self.set_null();
    }

    /// Mark NULL
    pub fn set_null(&mut self) {
        self.null = true;
        self.size = 0;
        self.storage.clear();
    }

    /// Overwrite the value with `bytes`, reusing existing storage
    pub fn fill(&mut self, bytes: &[u8]) {
        self.storage.clear();
        self.storage.extend_from_slice(bytes);
        self.size = bytes.len() as u32;
        self.null = false;
    }

    /// Whether the value is NULL
    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Byte length present
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Element kind of the slot
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Raw value bytes
    pub fn raw(&self) -> &[u8] {
        &self.storage
    }

    /// Mutable raw value bytes, used for byte-order fix-up
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Number of whole elements present
    pub fn element_count(&self) -> usize {
        self.storage.len() / self.kind.width()
    }

    /// First element as `T`; `None` when NULL or empty.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the attribute's element kind.
    pub fn value<T: Element>(&self) -> Option<T> {
        self.check_kind(T::KIND);
        if self.null {
            return None;
        }
        self.storage.get(..T::KIND.width()).map(T::from_ne_slice)
    }

    /// All elements as `T`; empty when NULL.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the attribute's element kind.
    pub fn values<T: Element>(&self) -> Vec<T> {
        self.check_kind(T::KIND);
        self.storage
            .chunks_exact(T::KIND.width())
            .map(T::from_ne_slice)
            .collect()
    }

    /// Element `index` as a tagged [`Scalar`]
    pub fn scalar(&self, index: usize) -> Option<Scalar> {
        if self.null {
            return None;
        }
        let width = self.kind.width();
        let start = index.checked_mul(width)?;
        let bytes = self.storage.get(start..start + width)?;
        Scalar::from_ne_bytes(self.kind, bytes)
    }

    /// Character bytes; `None` when NULL.
    ///
    /// # Panics
    ///
    /// Panics if the attribute is not a character attribute.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.check_kind(ElementKind::Char);
        if self.null {
            None
        } else {
            Some(&self.storage)
        }
    }

    /// Character data as UTF-8 with fixed-width padding (trailing spaces and
    /// NULs) removed; `None` when NULL or not valid UTF-8.
    ///
    /// # Panics
    ///
    /// Panics if the attribute is not a character attribute.
    pub fn as_str(&self) -> Option<&str> {
        let bytes = self.as_bytes()?;
        let end = bytes
            .iter()
            .rposition(|b| *b != b' ' && *b != 0)
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&bytes[..end]).ok()
    }

    fn check_kind(&self, requested: ElementKind) {
        assert_eq!(
            self.kind, requested,
            "attribute holds {} elements, {} requested",
            self.kind, requested
        );
    }
}
