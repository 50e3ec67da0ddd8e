//! MAT-file Level 5 container
//!
//! The staging format shared with Octave and MATLAB: `load` reads it on the
//! target side and `save -v6` produces it for the trip back.
//!
//! # Layout
//!
//! ```text
//! header   116 bytes text | 8 bytes subsystem offset | u16 version | "IM"
//! element  u32 type | u32 byte count | data | zero padding to 8 bytes
//! small    u16 byte count | u16 type | up to 4 data bytes   (count <= 4)
//! ```
//!
//! Each variable is one `miMATRIX` element holding sub-elements: array flags,
//! dimensions, name, then class-specific data. Numeric data is column-major.
//!
//! [`MatArray`] is the in-memory form both directions go through. Numeric
//! buffers reuse the core `ArrayData` but hold elements in column-major
//! order, exactly as they sit in the file.

mod reader;
mod writer;

pub use reader::{from_mat_array, load_variable, read_mat};
pub use writer::{encode_mat, to_mat_array};

use matbridge_core::{ArrayData, Dtype};

// Data element types
pub(crate) const MI_INT8: u32 = 1;
pub(crate) const MI_UINT8: u32 = 2;
pub(crate) const MI_INT16: u32 = 3;
pub(crate) const MI_UINT16: u32 = 4;
pub(crate) const MI_INT32: u32 = 5;
pub(crate) const MI_UINT32: u32 = 6;
pub(crate) const MI_SINGLE: u32 = 7;
pub(crate) const MI_DOUBLE: u32 = 9;
pub(crate) const MI_INT64: u32 = 12;
pub(crate) const MI_UINT64: u32 = 13;
pub(crate) const MI_MATRIX: u32 = 14;
pub(crate) const MI_COMPRESSED: u32 = 15;
pub(crate) const MI_UTF8: u32 = 16;
pub(crate) const MI_UTF16: u32 = 17;
pub(crate) const MI_UTF32: u32 = 18;

// Array flag bits
pub(crate) const FLAG_COMPLEX: u32 = 0x0800;
pub(crate) const FLAG_LOGICAL: u32 = 0x0200;

/// Longest struct field name the target accepts
pub const MAX_FIELD_NAME: usize = 63;

/// Array class codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MxClass {
    Cell = 1,
    Struct = 2,
    Object = 3,
    Char = 4,
    Sparse = 5,
    Double = 6,
    Single = 7,
    Int8 = 8,
    UInt8 = 9,
    Int16 = 10,
    UInt16 = 11,
    Int32 = 12,
    UInt32 = 13,
    Int64 = 14,
    UInt64 = 15,
}

impl MxClass {
    pub fn from_code(code: u32) -> Option<MxClass> {
        let class = match code {
            1 => MxClass::Cell,
            2 => MxClass::Struct,
            3 => MxClass::Object,
            4 => MxClass::Char,
            5 => MxClass::Sparse,
            6 => MxClass::Double,
            7 => MxClass::Single,
            8 => MxClass::Int8,
            9 => MxClass::UInt8,
            10 => MxClass::Int16,
            11 => MxClass::UInt16,
            12 => MxClass::Int32,
            13 => MxClass::UInt32,
            14 => MxClass::Int64,
            15 => MxClass::UInt64,
            _ => return None,
        };
        Some(class)
    }

    /// Class used to store a buffer of the given dtype
    ///
    /// The target has no half precision, so `float16` widens to single.
    pub fn for_dtype(dtype: Dtype) -> MxClass {
        match dtype {
            Dtype::Bool | Dtype::UInt8 => MxClass::UInt8,
            Dtype::Int8 => MxClass::Int8,
            Dtype::Int16 => MxClass::Int16,
            Dtype::Int32 => MxClass::Int32,
            Dtype::Int64 => MxClass::Int64,
            Dtype::UInt16 => MxClass::UInt16,
            Dtype::UInt32 => MxClass::UInt32,
            Dtype::UInt64 => MxClass::UInt64,
            Dtype::Float16 | Dtype::Float32 => MxClass::Single,
            Dtype::Float64 | Dtype::Complex128 => MxClass::Double,
        }
    }

    /// Dtype a numeric class reads back as
    pub fn dtype(&self, logical: bool, complex: bool) -> Option<Dtype> {
        if logical {
            return Some(Dtype::Bool);
        }
        if complex {
            return match self {
                MxClass::Double | MxClass::Single => Some(Dtype::Complex128),
                _ => None,
            };
        }
        let dtype = match self {
            MxClass::Double => Dtype::Float64,
            MxClass::Single => Dtype::Float32,
            MxClass::Int8 => Dtype::Int8,
            MxClass::UInt8 => Dtype::UInt8,
            MxClass::Int16 => Dtype::Int16,
            MxClass::UInt16 => Dtype::UInt16,
            MxClass::Int32 => Dtype::Int32,
            MxClass::UInt32 => Dtype::UInt32,
            MxClass::Int64 => Dtype::Int64,
            MxClass::UInt64 => Dtype::UInt64,
            MxClass::Cell
            | MxClass::Struct
            | MxClass::Object
            | MxClass::Char
            | MxClass::Sparse => return None,
        };
        Some(dtype)
    }
}

/// One array as stored in a MAT file
#[derive(Debug, Clone, PartialEq)]
pub enum MatArray {
    /// Numeric or logical array, buffer in column-major order
    Numeric { dims: Vec<usize>, data: ArrayData },
    /// Character array as UTF-16 code units, column-major
    Char { dims: Vec<usize>, units: Vec<u16> },
    /// Cell array, items column-major
    Cell { dims: Vec<usize>, items: Vec<MatArray> },
    /// Struct array; `values[element * fields.len() + field]`
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        values: Vec<MatArray>,
    },
}

/// Whether `name` is a valid target variable or struct field name
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= MAX_FIELD_NAME && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("a"));
        assert!(is_valid_identifier("column_1"));
        assert!(!is_valid_identifier("_hidden"));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"x".repeat(64)));
    }

    #[test]
    fn test_class_dtype_mapping() {
        assert_eq!(MxClass::for_dtype(Dtype::Float16), MxClass::Single);
        assert_eq!(MxClass::UInt8.dtype(true, false), Some(Dtype::Bool));
        assert_eq!(MxClass::Double.dtype(false, true), Some(Dtype::Complex128));
        assert_eq!(MxClass::Int32.dtype(false, true), None);
        assert_eq!(MxClass::Cell.dtype(false, false), None);
    }
}
