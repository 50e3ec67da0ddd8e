//! matbridge core: the host-side value model
//!
//! This crate holds the data that moves between an orchestrating notebook
//! kernel and an Octave/MATLAB kernel, independent of how it is encoded.
//!
//! # Modules
//!
//! - `value`: the `Value` sum type, `Mapping`, `MapKey`, fixed-width `Scalar`
//! - `array`: typed N-dimensional arrays and element conversion
//! - `table`: named-column tables

pub mod array;
pub mod table;
pub mod value;

pub use array::{ArrayData, ArrayError, Complex64, Dtype, Element, NdArray};
pub use table::{Column, Table, TableError};
pub use value::{MapKey, Mapping, Scalar, Value, format_host_float, quote_host_str};
