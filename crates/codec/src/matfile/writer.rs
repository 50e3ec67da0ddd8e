//! Value -> MAT v5 bytes
//!
//! Host values map onto target classes as follows:
//!
//! | value            | class                                   |
//! |------------------|-----------------------------------------|
//! | `Null`           | double `NaN`                            |
//! | `Bool`           | logical 1x1                             |
//! | `Int`            | int64 1x1                               |
//! | `Float`          | double 1x1                              |
//! | `Complex`        | complex double 1x1                      |
//! | `Scalar`         | its own class (`float16` widens)        |
//! | `Str`            | char 1xN (empty string is 0x0)          |
//! | `Seq`            | logical/double/complex row, else cell   |
//! | `Set`            | cell row                                |
//! | `Map`            | 1x1 struct, keys must be identifiers    |
//! | `Matrix`/`Array` | numeric, column-major                   |
//!
//! Tables have no staged MAT form and are rejected.

use super::{
    FLAG_COMPLEX, FLAG_LOGICAL, MI_DOUBLE, MI_INT8, MI_INT16, MI_INT32, MI_INT64, MI_MATRIX,
    MI_SINGLE, MI_UINT8, MI_UINT16, MI_UINT32, MI_UINT64, MatArray, MxClass, is_valid_identifier,
};
use crate::error::CodecError;
use matbridge_core::array::column_major_order;
use matbridge_core::{ArrayData, Complex64, Dtype, MapKey, NdArray, Value};

const HEADER_TEXT: &str = "MATLAB 5.0 MAT-file, written by matbridge";
const HEADER_TEXT_LEN: usize = 116;
const VERSION: u16 = 0x0100;

// ============================================================================
// Value -> MatArray
// ============================================================================

fn scalar(data: ArrayData) -> MatArray {
    MatArray::Numeric {
        dims: vec![1, 1],
        data,
    }
}

fn row(data: ArrayData) -> MatArray {
    MatArray::Numeric {
        dims: vec![1, data.len()],
        data,
    }
}

/// Numeric view of a sequence item, if it takes part in a numeric row
fn seq_number(item: &Value) -> Option<Complex64> {
    match item {
        Value::Bool(b) => Some(Complex64::new(if *b { 1.0 } else { 0.0 }, 0.0)),
        Value::Int(n) => Some(Complex64::new(*n as f64, 0.0)),
        Value::Float(x) => Some(Complex64::new(*x, 0.0)),
        Value::Complex(c) => Some(*c),
        _ => None,
    }
}

fn seq_to_mat(items: &[Value]) -> Result<MatArray, CodecError> {
    if items.is_empty() {
        return Ok(MatArray::Numeric {
            dims: vec![0, 0],
            data: ArrayData::Float64(Vec::new()),
        });
    }
    if let Some(bools) = items
        .iter()
        .map(|v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
    {
        return Ok(row(ArrayData::Bool(bools)));
    }
    if let Some(numbers) = items.iter().map(seq_number).collect::<Option<Vec<_>>>() {
        if items.iter().any(|v| matches!(v, Value::Complex(_))) {
            return Ok(row(ArrayData::Complex128(numbers)));
        }
        return Ok(row(ArrayData::Float64(
            numbers.into_iter().map(|c| c.re).collect(),
        )));
    }
    cell_row(items)
}

fn cell_row(items: &[Value]) -> Result<MatArray, CodecError> {
    let items = items
        .iter()
        .map(to_mat_array)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MatArray::Cell {
        dims: vec![1, items.len()],
        items,
    })
}

fn array_to_mat(array: &NdArray) -> Result<MatArray, CodecError> {
    let array = if array.dtype() == Dtype::Float16 {
        array.cast(Dtype::Float32)?
    } else {
        array.clone()
    };
    let dims = match array.shape() {
        [] => vec![1, 1],
        [n] => vec![1, *n],
        shape => shape.to_vec(),
    };
    let order = column_major_order(array.shape());
    Ok(MatArray::Numeric {
        dims,
        data: array.data().permuted(&order),
    })
}

/// Convert a host value into the array that represents it in a MAT file
pub fn to_mat_array(value: &Value) -> Result<MatArray, CodecError> {
    let array = match value {
        Value::Null => scalar(ArrayData::Float64(vec![f64::NAN])),
        Value::Bool(b) => scalar(ArrayData::Bool(vec![*b])),
        Value::Int(n) => scalar(ArrayData::Int64(vec![*n])),
        Value::Float(x) => scalar(ArrayData::Float64(vec![*x])),
        Value::Complex(c) => scalar(ArrayData::Complex128(vec![*c])),
        Value::Scalar(s) => {
            let dtype = match s.dtype() {
                Dtype::Float16 => Dtype::Float32,
                other => other,
            };
            scalar(ArrayData::from_elements(dtype, &[s.element()])?)
        }
        Value::Str(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let dims = if units.is_empty() {
                vec![0, 0]
            } else {
                vec![1, units.len()]
            };
            MatArray::Char { dims, units }
        }
        Value::Seq(items) => seq_to_mat(items)?,
        Value::Set(items) => cell_row(items)?,
        Value::Map(map) => {
            let mut fields = Vec::with_capacity(map.len());
            let mut values = Vec::with_capacity(map.len());
            for (key, item) in map.iter() {
                let name = match key {
                    MapKey::Str(s) if is_valid_identifier(s) => s.clone(),
                    other => {
                        return Err(CodecError::unsupported(
                            "dict",
                            format!("key {} is not a valid field name", other),
                        ));
                    }
                };
                fields.push(name);
                values.push(to_mat_array(item)?);
            }
            MatArray::Struct {
                dims: vec![1, 1],
                fields,
                values,
            }
        }
        Value::Matrix(m) | Value::Array(m) => array_to_mat(m)?,
        Value::Table(_) => {
            return Err(CodecError::unsupported(
                "DataFrame",
                "tables cannot be nested in a staged container",
            ));
        }
    };
    Ok(array)
}

// ============================================================================
// MatArray -> bytes
// ============================================================================

fn byte_count(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len)
        .map_err(|_| CodecError::MatFile(format!("element of {} bytes is too large", len)))
}

fn pad_to_8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

/// Append one data element, packing payloads of up to 4 bytes into the tag
fn write_element(buf: &mut Vec<u8>, mi_type: u32, data: &[u8]) -> Result<(), CodecError> {
    if !data.is_empty() && data.len() <= 4 {
        let tag = ((data.len() as u32) << 16) | mi_type;
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(data);
        buf.resize(buf.len() + 4 - data.len(), 0);
        return Ok(());
    }
    buf.extend_from_slice(&mi_type.to_le_bytes());
    buf.extend_from_slice(&byte_count(data.len())?.to_le_bytes());
    buf.extend_from_slice(data);
    pad_to_8(buf);
    Ok(())
}

fn le_bytes<T, const N: usize>(values: &[T], to_le: impl Fn(&T) -> [u8; N]) -> Vec<u8> {
    values.iter().flat_map(to_le).collect()
}

/// Storage type and little-endian bytes of a real buffer
fn numeric_payload(data: &ArrayData) -> (u32, Vec<u8>) {
    match data {
        ArrayData::Bool(v) => (MI_UINT8, v.iter().map(|b| *b as u8).collect()),
        ArrayData::Int8(v) => (MI_INT8, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Int16(v) => (MI_INT16, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Int32(v) => (MI_INT32, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Int64(v) => (MI_INT64, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::UInt8(v) => (MI_UINT8, v.clone()),
        ArrayData::UInt16(v) => (MI_UINT16, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::UInt32(v) => (MI_UINT32, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::UInt64(v) => (MI_UINT64, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Float16(v) => (MI_SINGLE, le_bytes(v, |x| x.to_f32().to_le_bytes())),
        ArrayData::Float32(v) => (MI_SINGLE, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Float64(v) => (MI_DOUBLE, le_bytes(v, |x| x.to_le_bytes())),
        ArrayData::Complex128(v) => (MI_DOUBLE, le_bytes(v, |c| c.re.to_le_bytes())),
    }
}

fn write_header_fields(
    buf: &mut Vec<u8>,
    class: MxClass,
    flags: u32,
    dims: &[usize],
    name: &str,
) -> Result<(), CodecError> {
    let mut flag_bytes = Vec::with_capacity(8);
    flag_bytes.extend_from_slice(&((class as u32) | flags).to_le_bytes());
    flag_bytes.extend_from_slice(&0u32.to_le_bytes());
    write_element(buf, MI_UINT32, &flag_bytes)?;

    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for &d in dims {
        let d = i32::try_from(d)
            .map_err(|_| CodecError::MatFile(format!("dimension {} is too large", d)))?;
        dim_bytes.extend_from_slice(&d.to_le_bytes());
    }
    write_element(buf, MI_INT32, &dim_bytes)?;
    write_element(buf, MI_INT8, name.as_bytes())
}

/// Encode the body of one `miMATRIX` element
fn write_matrix_body(buf: &mut Vec<u8>, array: &MatArray, name: &str) -> Result<(), CodecError> {
    match array {
        MatArray::Numeric { dims, data } => {
            let class = MxClass::for_dtype(data.dtype());
            let mut flags = 0;
            if data.dtype() == Dtype::Bool {
                flags |= FLAG_LOGICAL;
            }
            if let ArrayData::Complex128(_) = data {
                flags |= FLAG_COMPLEX;
            }
            write_header_fields(buf, class, flags, dims, name)?;
            let (mi_type, real) = numeric_payload(data);
            write_element(buf, mi_type, &real)?;
            if let ArrayData::Complex128(v) = data {
                write_element(buf, MI_DOUBLE, &le_bytes(v, |c| c.im.to_le_bytes()))?;
            }
        }
        MatArray::Char { dims, units } => {
            write_header_fields(buf, MxClass::Char, 0, dims, name)?;
            write_element(buf, MI_UINT16, &le_bytes(units, |u| u.to_le_bytes()))?;
        }
        MatArray::Cell { dims, items } => {
            write_header_fields(buf, MxClass::Cell, 0, dims, name)?;
            for item in items {
                write_matrix(buf, item, "")?;
            }
        }
        MatArray::Struct {
            dims,
            fields,
            values,
        } => {
            write_header_fields(buf, MxClass::Struct, 0, dims, name)?;
            // Each name is NUL-terminated inside a fixed-width slot
            let width = fields.iter().map(|f| f.len()).max().unwrap_or(0) + 1;
            write_element(buf, MI_INT32, &(width as i32).to_le_bytes())?;
            let mut names = Vec::with_capacity(width * fields.len());
            for field in fields {
                names.extend_from_slice(field.as_bytes());
                names.resize(names.len() + width - field.len(), 0);
            }
            write_element(buf, MI_INT8, &names)?;
            for value in values {
                write_matrix(buf, value, "")?;
            }
        }
    }
    Ok(())
}

fn write_matrix(buf: &mut Vec<u8>, array: &MatArray, name: &str) -> Result<(), CodecError> {
    let mut body = Vec::new();
    write_matrix_body(&mut body, array, name)?;
    buf.extend_from_slice(&MI_MATRIX.to_le_bytes());
    buf.extend_from_slice(&byte_count(body.len())?.to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(())
}

fn write_header(buf: &mut Vec<u8>) {
    let mut text = HEADER_TEXT.as_bytes().to_vec();
    text.resize(HEADER_TEXT_LEN, b' ');
    buf.extend_from_slice(&text);
    // Subsystem data offset: none
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(b"IM");
}

/// Encode named values as a little-endian MAT v5 file
///
/// Every name must be a valid target identifier.
pub fn encode_mat(vars: &[(&str, &Value)]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    write_header(&mut buf);
    for (name, value) in vars {
        if !is_valid_identifier(name) {
            return Err(CodecError::MatFile(format!(
                "'{}' is not a valid variable name",
                name
            )));
        }
        let array = to_mat_array(value)?;
        write_matrix(&mut buf, &array, name)?;
    }
    Ok(buf)
}
