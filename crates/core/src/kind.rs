//! Element kinds
//!
//! Every attribute stores a sequence of elements of one kind. The kind fixes
//! the element width, which in turn drives word-size computation and
//! byte-order fix-up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    Uint8,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    Uint16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    Uint32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    Uint64,
    /// IEEE-754 single precision
    Float32,
    /// IEEE-754 double precision
    Float64,
    /// Raw character byte
    Char,
}

impl ElementKind {
    /// Decode a kind from its descriptor code
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => ElementKind::Int8,
            2 => ElementKind::Uint8,
            3 => ElementKind::Int16,
            4 => ElementKind::Uint16,
            5 => ElementKind::Int32,
            6 => ElementKind::Uint32,
            7 => ElementKind::Int64,
            8 => ElementKind::Uint64,
            9 => ElementKind::Float32,
            10 => ElementKind::Float64,
            11 => ElementKind::Char,
            _ => return None,
        })
    }

    /// Descriptor code for this kind
    pub fn code(self) -> u32 {
        match self {
            ElementKind::Int8 => 1,
            ElementKind::Uint8 => 2,
            ElementKind::Int16 => 3,
            ElementKind::Uint16 => 4,
            ElementKind::Int32 => 5,
            ElementKind::Uint32 => 6,
            ElementKind::Int64 => 7,
            ElementKind::Uint64 => 8,
            ElementKind::Float32 => 9,
            ElementKind::Float64 => 10,
            ElementKind::Char => 11,
        }
    }

    /// Element width in bytes
    pub fn width(self) -> usize {
        match self {
            ElementKind::Int8 | ElementKind::Uint8 | ElementKind::Char => 1,
            ElementKind::Int16 | ElementKind::Uint16 => 2,
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Float32 => 4,
            ElementKind::Int64 | ElementKind::Uint64 | ElementKind::Float64 => 8,
        }
    }

    /// Element width in bits
    pub fn size_in_bits(self) -> u32 {
        self.width() as u32 * 8
    }

    /// Whether elements are raw bytes rather than numbers
    pub fn is_character(self) -> bool {
        self == ElementKind::Char
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Int8 => "int8",
            ElementKind::Uint8 => "uint8",
            ElementKind::Int16 => "int16",
            ElementKind::Uint16 => "uint16",
            ElementKind::Int32 => "int32",
            ElementKind::Uint32 => "uint32",
            ElementKind::Int64 => "int64",
            ElementKind::Uint64 => "uint64",
            ElementKind::Float32 => "float32",
            ElementKind::Float64 => "float64",
            ElementKind::Char => "char",
        };
        f.write_str(name)
    }
}

/// One decoded element, tagged with its kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Signed 8-bit integer
    Int8(i8),
    /// Unsigned 8-bit integer
    Uint8(u8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Single precision float
    Float32(f32),
    /// Double precision float
    Float64(f64),
    /// Character byte
    Char(u8),
}

impl Scalar {
    /// Decode one element of `kind` from host-order bytes.
    ///
    /// Returns `None` if `bytes` is not exactly one element wide.
    pub fn from_ne_bytes(kind: ElementKind, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != kind.width() {
            return None;
        }
        Some(match kind {
            ElementKind::Int8 => Scalar::Int8(i8::from_ne_bytes([bytes[0]])),
            ElementKind::Uint8 => Scalar::Uint8(bytes[0]),
            ElementKind::Char => Scalar::Char(bytes[0]),
            ElementKind::Int16 => Scalar::Int16(i16::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Uint16 => Scalar::Uint16(u16::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Int32 => Scalar::Int32(i32::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Uint32 => Scalar::Uint32(u32::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Int64 => Scalar::Int64(i64::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Uint64 => Scalar::Uint64(u64::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Float32 => Scalar::Float32(f32::from_ne_bytes(bytes.try_into().ok()?)),
            ElementKind::Float64 => Scalar::Float64(f64::from_ne_bytes(bytes.try_into().ok()?)),
        })
    }

    /// Kind of this element
    pub fn kind(&self) -> ElementKind {
        match self {
            Scalar::Int8(_) => ElementKind::Int8,
            Scalar::Uint8(_) => ElementKind::Uint8,
            Scalar::Int16(_) => ElementKind::Int16,
            Scalar::Uint16(_) => ElementKind::Uint16,
            Scalar::Int32(_) => ElementKind::Int32,
            Scalar::Uint32(_) => ElementKind::Uint32,
            Scalar::Int64(_) => ElementKind::Int64,
            Scalar::Uint64(_) => ElementKind::Uint64,
            Scalar::Float32(_) => ElementKind::Float32,
            Scalar::Float64(_) => ElementKind::Float64,
            Scalar::Char(_) => ElementKind::Char,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types that can be read out of an attribute value
///
/// Implemented for the fixed-width integer and float types; the associated
/// [`Element::KIND`] is checked against the attribute's declared kind.
pub trait Element: Copy + sealed::Sealed {
    /// Kind this type reads
    const KIND: ElementKind;

    /// Decode from exactly `KIND.width()` host-order bytes
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;

                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);
