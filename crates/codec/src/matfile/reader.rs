//! MAT v5 bytes -> values
//!
//! Reads files written by `save -v6` on either target, and by the writer in
//! this crate. Both byte orders are accepted; the header's endian marker
//! decides. Compressed (`miCOMPRESSED`) variables are inflated in place.
//!
//! A numeric class may be stored with a narrower type than its class
//! (doubles holding small integers are commonly written as `miUINT8`), so
//! data is widened through `Element` and then cast to the class dtype.

use super::{
    FLAG_COMPLEX, FLAG_LOGICAL, MI_COMPRESSED, MI_DOUBLE, MI_INT8, MI_INT16, MI_INT32, MI_INT64,
    MI_MATRIX, MI_SINGLE, MI_UINT8, MI_UINT16, MI_UINT32, MI_UINT64, MI_UTF8, MI_UTF16, MI_UTF32,
    MatArray, MxClass,
};
use crate::error::CodecError;
use flate2::read::ZlibDecoder;
use matbridge_core::array::row_major_order;
use matbridge_core::{ArrayData, Complex64, Dtype, Element, MapKey, Mapping, NdArray, Scalar, Value};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const HEADER_LEN: usize = 128;

fn malformed(msg: impl Into<String>) -> CodecError {
    CodecError::MatFile(msg.into())
}

/// Element count of `dims`, rejecting headers whose product overflows
fn checked_numel(dims: &[usize]) -> Result<usize, CodecError> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| malformed(format!("dimensions {:?} are too large", dims)))
}

// ============================================================================
// Cursor
// ============================================================================

/// Bounds-checked reader over a byte slice in the file's byte order
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], big_endian: bool) -> Self {
        Cursor {
            data,
            pos: 0,
            big_endian,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                malformed(format!(
                    "need {} bytes at offset {}, only {} remain",
                    len,
                    self.pos,
                    self.data.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn skip_padding(&mut self) {
        let aligned = self.pos.div_ceil(8) * 8;
        self.pos = aligned.min(self.data.len());
    }

    /// Read one tagged element, returning its type and payload
    fn read_element(&mut self) -> Result<(u32, &'a [u8]), CodecError> {
        let tag = self.read_u32()?;
        let small_len = tag >> 16;
        if small_len != 0 {
            // Small element: count and type share the tag, data fills 4 bytes
            let payload = self.take(4)?;
            let len = small_len as usize;
            if len > 4 {
                return Err(malformed(format!("small element of {} bytes", len)));
            }
            return Ok((tag & 0xffff, &payload[..len]));
        }
        let len = self.read_u32()? as usize;
        let payload = self.take(len)?;
        if tag != MI_COMPRESSED {
            self.skip_padding();
        }
        Ok((tag, payload))
    }

    /// Read an element that must have the given type
    fn expect_element(&mut self, expected: u32, what: &str) -> Result<&'a [u8], CodecError> {
        let (mi_type, payload) = self.read_element()?;
        if mi_type != expected {
            return Err(malformed(format!(
                "{}: expected element type {}, found {}",
                what, expected, mi_type
            )));
        }
        Ok(payload)
    }
}

// ============================================================================
// Element decoding
// ============================================================================

macro_rules! decode_as {
    ($bytes:expr, $big:expr, $ty:ty, $wrap:expr) => {{
        const N: usize = std::mem::size_of::<$ty>();
        let wrap = $wrap;
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                let v = if $big {
                    <$ty>::from_be_bytes(raw)
                } else {
                    <$ty>::from_le_bytes(raw)
                };
                wrap(v)
            })
            .collect::<Vec<Element>>()
    }};
}

/// Decode a numeric payload of any storage type into widened elements
fn decode_numeric(mi_type: u32, bytes: &[u8], big: bool) -> Result<Vec<Element>, CodecError> {
    let elements = match mi_type {
        MI_INT8 => decode_as!(bytes, big, i8, |v: i8| Element::Int(v as i128)),
        MI_UINT8 => decode_as!(bytes, big, u8, |v: u8| Element::Int(v as i128)),
        MI_INT16 => decode_as!(bytes, big, i16, |v: i16| Element::Int(v as i128)),
        MI_UINT16 => decode_as!(bytes, big, u16, |v: u16| Element::Int(v as i128)),
        MI_INT32 => decode_as!(bytes, big, i32, |v: i32| Element::Int(v as i128)),
        MI_UINT32 => decode_as!(bytes, big, u32, |v: u32| Element::Int(v as i128)),
        MI_INT64 => decode_as!(bytes, big, i64, |v: i64| Element::Int(v as i128)),
        MI_UINT64 => decode_as!(bytes, big, u64, |v: u64| Element::Int(v as i128)),
        MI_SINGLE => decode_as!(bytes, big, f32, |v: f32| Element::Float(v as f64)),
        MI_DOUBLE => decode_as!(bytes, big, f64, |v: f64| Element::Float(v)),
        other => return Err(malformed(format!("element type {} is not numeric", other))),
    };
    Ok(elements)
}

fn real_part(element: Element) -> f64 {
    match element {
        Element::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        Element::Int(n) => n as f64,
        Element::Float(x) => x,
        Element::Complex(c) => c.re,
    }
}

/// Decode character data into UTF-16 code units
fn decode_chars(mi_type: u32, bytes: &[u8], big: bool) -> Result<Vec<u16>, CodecError> {
    let units = match mi_type {
        MI_UTF8 => String::from_utf8_lossy(bytes).encode_utf16().collect(),
        MI_UINT8 | MI_INT8 => bytes.iter().map(|&b| b as u16).collect(),
        MI_UINT16 | MI_UTF16 => decode_numeric(MI_UINT16, bytes, big)?
            .into_iter()
            .map(|e| real_part(e) as u16)
            .collect(),
        MI_UTF32 => {
            let text: String = decode_numeric(MI_UINT32, bytes, big)?
                .into_iter()
                .map(|e| char::from_u32(real_part(e) as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();
            text.encode_utf16().collect()
        }
        other => return Err(malformed(format!("element type {} is not text", other))),
    };
    Ok(units)
}

// ============================================================================
// Arrays
// ============================================================================

fn read_dims(cursor: &mut Cursor<'_>) -> Result<Vec<usize>, CodecError> {
    let payload = cursor.expect_element(MI_INT32, "dimensions")?;
    decode_numeric(MI_INT32, payload, cursor.big_endian)?
        .into_iter()
        .map(|e| match e {
            Element::Int(n) if n >= 0 => Ok(n as usize),
            _ => Err(malformed("negative dimension")),
        })
        .collect()
}

/// Parse the body of one `miMATRIX` element into its name and array
fn parse_matrix(body: &[u8], big_endian: bool) -> Result<(String, MatArray), CodecError> {
    if body.is_empty() {
        // An empty matrix element stands for []
        return Ok((
            String::new(),
            MatArray::Numeric {
                dims: vec![0, 0],
                data: ArrayData::Float64(Vec::new()),
            },
        ));
    }
    let mut cursor = Cursor::new(body, big_endian);

    let flags_payload = cursor.expect_element(MI_UINT32, "array flags")?;
    let flags = decode_numeric(MI_UINT32, flags_payload, big_endian)?
        .first()
        .map(|&e| real_part(e) as u32)
        .ok_or_else(|| malformed("empty array flags"))?;
    let class = MxClass::from_code(flags & 0xff)
        .ok_or_else(|| malformed(format!("unknown array class {}", flags & 0xff)))?;
    let dims = read_dims(&mut cursor)?;
    let name_bytes = cursor.expect_element(MI_INT8, "array name")?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    let numel = checked_numel(&dims)?;

    let array = match class {
        MxClass::Cell => {
            let items = (0..numel)
                .map(|_| read_nested(&mut cursor))
                .collect::<Result<Vec<_>, _>>()?;
            MatArray::Cell { dims, items }
        }
        MxClass::Struct => {
            let width_payload = cursor.expect_element(MI_INT32, "field name length")?;
            let width = decode_numeric(MI_INT32, width_payload, big_endian)?
                .first()
                .map(|&e| real_part(e) as usize)
                .filter(|&w| w > 0)
                .ok_or_else(|| malformed("invalid field name length"))?;
            let names = cursor.expect_element(MI_INT8, "field names")?;
            let fields: Vec<String> = names
                .chunks(width)
                .map(|chunk| {
                    let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                    String::from_utf8_lossy(&chunk[..end]).into_owned()
                })
                .collect();
            let count = numel
                .checked_mul(fields.len())
                .ok_or_else(|| malformed("struct has too many field values"))?;
            let values = (0..count)
                .map(|_| read_nested(&mut cursor))
                .collect::<Result<Vec<_>, _>>()?;
            MatArray::Struct {
                dims,
                fields,
                values,
            }
        }
        MxClass::Char => {
            let units = if cursor.at_end() {
                Vec::new()
            } else {
                let (mi_type, payload) = cursor.read_element()?;
                decode_chars(mi_type, payload, big_endian)?
            };
            MatArray::Char { dims, units }
        }
        MxClass::Object | MxClass::Sparse => {
            return Err(CodecError::unsupported(
                "mat-file",
                format!("class {:?} of '{}' cannot be read", class, name),
            ));
        }
        numeric => {
            let logical = flags & FLAG_LOGICAL != 0;
            let complex = flags & FLAG_COMPLEX != 0;
            let dtype = numeric
                .dtype(logical, complex)
                .ok_or_else(|| malformed(format!("complex {:?} array", numeric)))?;
            let (mi_type, real) = if cursor.at_end() && numel == 0 {
                (MI_DOUBLE, &[][..])
            } else {
                cursor.read_element()?
            };
            let mut elements = decode_numeric(mi_type, real, big_endian)?;
            if complex {
                let (mi_type, imag) = cursor.read_element()?;
                let imag = decode_numeric(mi_type, imag, big_endian)?;
                if imag.len() != elements.len() {
                    return Err(malformed("real and imaginary parts differ in length"));
                }
                elements = elements
                    .into_iter()
                    .zip(imag)
                    .map(|(re, im)| Element::Complex(Complex64::new(real_part(re), real_part(im))))
                    .collect();
            }
            if elements.len() != numel {
                return Err(malformed(format!(
                    "'{}' has {} elements, dimensions say {}",
                    name,
                    elements.len(),
                    numel
                )));
            }
            let data = ArrayData::from_elements(dtype, &elements)?;
            MatArray::Numeric { dims, data }
        }
    };
    Ok((name, array))
}

fn read_nested(cursor: &mut Cursor<'_>) -> Result<MatArray, CodecError> {
    let body = cursor.expect_element(MI_MATRIX, "nested array")?;
    parse_matrix(body, cursor.big_endian).map(|(_, array)| array)
}

/// Parse a whole MAT v5 file into its named arrays, in file order
pub fn read_mat(bytes: &[u8]) -> Result<Vec<(String, MatArray)>, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(malformed("file is shorter than the 128-byte header"));
    }
    let big_endian = match &bytes[126..128] {
        b"IM" => false,
        b"MI" => true,
        _ => return Err(malformed("missing endian indicator")),
    };

    let mut cursor = Cursor::new(&bytes[HEADER_LEN..], big_endian);
    let mut vars = Vec::new();
    while !cursor.at_end() {
        let (mi_type, payload) = cursor.read_element()?;
        match mi_type {
            MI_MATRIX => vars.push(parse_matrix(payload, big_endian)?),
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(payload)
                    .read_to_end(&mut inflated)
                    .map_err(|e| malformed(format!("cannot inflate element: {}", e)))?;
                let mut inner = Cursor::new(&inflated, big_endian);
                let body = inner.expect_element(MI_MATRIX, "compressed variable")?;
                vars.push(parse_matrix(body, big_endian)?);
            }
            other => debug!("Skipping top-level MAT element of type {}", other),
        }
    }
    Ok(vars)
}

// ============================================================================
// MatArray -> Value
// ============================================================================

fn numeric_scalar(data: &ArrayData) -> Option<Value> {
    let element = data.element(0)?;
    let value = match (data.dtype(), element) {
        (Dtype::Bool, Element::Bool(b)) => Value::Bool(b),
        (Dtype::Float64, Element::Float(x)) => Value::Float(x),
        (Dtype::Complex128, Element::Complex(c)) => Value::Complex(c),
        (Dtype::Int64, Element::Int(n)) => Value::Int(i64::try_from(n).ok()?),
        (dtype, element) => Value::Scalar(Scalar::from_element(dtype, element)?),
    };
    Some(value)
}

fn numeric_array(dims: Vec<usize>, data: ArrayData) -> Result<Value, CodecError> {
    let data = data.permuted(&row_major_order(&dims));
    Ok(Value::Array(NdArray::new(dims, data)?))
}

fn char_value(dims: &[usize], units: &[u16]) -> Value {
    let rows = dims.first().copied().unwrap_or(0);
    if rows <= 1 {
        return Value::Str(String::from_utf16_lossy(units));
    }
    let cols = units.len() / rows;
    let lines = (0..rows)
        .map(|r| {
            let line: Vec<u16> = (0..cols).map(|c| units[r + c * rows]).collect();
            Value::Str(String::from_utf16_lossy(&line))
        })
        .collect();
    Value::Seq(lines)
}

/// Convert a MAT array into a host value
///
/// Single-element numeric arrays inside cells and structs become scalars;
/// a top-level numeric array keeps its dimensions, matching what a
/// `loadmat(...)[name]` lookup yields.
pub fn from_mat_array(array: MatArray, top_level: bool) -> Result<Value, CodecError> {
    let value = match array {
        MatArray::Numeric { dims, data } => {
            if !top_level && data.len() == 1 {
                if let Some(v) = numeric_scalar(&data) {
                    return Ok(v);
                }
            }
            numeric_array(dims, data)?
        }
        MatArray::Char { dims, units } => char_value(&dims, &units),
        MatArray::Cell { items, .. } => Value::Seq(
            items
                .into_iter()
                .map(|item| from_mat_array(item, false))
                .collect::<Result<_, _>>()?,
        ),
        MatArray::Struct {
            dims,
            fields,
            values,
        } => {
            let numel = checked_numel(&dims)?;
            let mut records = Vec::with_capacity(numel);
            let mut values = values.into_iter();
            for _ in 0..numel {
                let mut map = Mapping::new();
                for field in &fields {
                    let item = values
                        .next()
                        .ok_or_else(|| malformed("struct is missing field values"))?;
                    map.insert(MapKey::Str(field.clone()), from_mat_array(item, false)?);
                }
                records.push(Value::Map(map));
            }
            if numel == 1 {
                records.pop().unwrap_or(Value::Null)
            } else {
                Value::Seq(records)
            }
        }
    };
    Ok(value)
}

/// Read one variable from a staged MAT file
pub fn load_variable(path: &Path, name: &str) -> Result<Value, CodecError> {
    let bytes = fs::read(path).map_err(|e| CodecError::io(path, e))?;
    let (_, array) = read_mat(&bytes)?
        .into_iter()
        .find(|(n, _)| n == name)
        .ok_or_else(|| {
            malformed(format!("{} has no variable '{}'", path.display(), name))
        })?;
    from_mat_array(array, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matfile::encode_mat;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn round_trip(value: &Value) -> MatArray {
        let bytes = encode_mat(&[("obj", value)]).unwrap();
        let mut vars = read_mat(&bytes).unwrap();
        assert_eq!(vars.len(), 1);
        let (name, array) = vars.remove(0);
        assert_eq!(name, "obj");
        array
    }

    #[test]
    fn test_reads_back_matrix_column_major() {
        let m = NdArray::new(vec![2, 3], ArrayData::Int32(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let array = round_trip(&Value::Matrix(m.clone()));
        assert_eq!(
            array,
            MatArray::Numeric {
                dims: vec![2, 3],
                data: ArrayData::Int32(vec![1, 4, 2, 5, 3, 6])
            }
        );
        assert_eq!(from_mat_array(array, true).unwrap(), Value::Array(m));
    }

    #[test]
    fn test_reads_back_struct() {
        let v = Value::map([
            ("a", Value::Int(1)),
            ("name", Value::str("Leonardo")),
            ("flags", Value::Seq(vec![Value::Bool(true), Value::Bool(false)])),
        ]);
        let back = from_mat_array(round_trip(&v), true).unwrap();
        let expected_flags =
            NdArray::new(vec![1, 2], ArrayData::Bool(vec![true, false])).unwrap();
        assert_eq!(
            back,
            Value::map([
                ("a", Value::Int(1)),
                ("name", Value::str("Leonardo")),
                ("flags", Value::Array(expected_flags)),
            ])
        );
    }

    #[test]
    fn test_reads_back_complex_and_cell() {
        let v = Value::Seq(vec![Value::Complex(Complex64::new(1.0, -2.0)), Value::str("x")]);
        let back = from_mat_array(round_trip(&v), true).unwrap();
        assert_eq!(
            back,
            Value::Seq(vec![Value::Complex(Complex64::new(1.0, -2.0)), Value::str("x")])
        );
    }

    #[test]
    fn test_big_endian_file() {
        let mut bytes = vec![b' '; 116];
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&0x0100u16.to_be_bytes());
        bytes.extend_from_slice(b"MI");

        let mut body = Vec::new();
        // flags: double, not complex
        body.extend_from_slice(&MI_UINT32.to_be_bytes());
        body.extend_from_slice(&8u32.to_be_bytes());
        body.extend_from_slice(&(MxClass::Double as u32).to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        // dims 1x2
        body.extend_from_slice(&MI_INT32.to_be_bytes());
        body.extend_from_slice(&8u32.to_be_bytes());
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(&2i32.to_be_bytes());
        // name "x", small element
        body.extend_from_slice(&((1u32 << 16) | MI_INT8).to_be_bytes());
        body.extend_from_slice(&[b'x', 0, 0, 0]);
        // data stored as uint8 though the class is double
        body.extend_from_slice(&((2u32 << 16) | MI_UINT8).to_be_bytes());
        body.extend_from_slice(&[7, 9, 0, 0]);

        bytes.extend_from_slice(&MI_MATRIX.to_be_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);

        let vars = read_mat(&bytes).unwrap();
        assert_eq!(
            vars,
            vec![(
                "x".to_string(),
                MatArray::Numeric {
                    dims: vec![1, 2],
                    data: ArrayData::Float64(vec![7.0, 9.0])
                }
            )]
        );
    }

    #[test]
    fn test_overflowing_dims() {
        let mut bytes = encode_mat(&[]).unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&MI_UINT32.to_le_bytes());
        body.extend_from_slice(&8u32.to_le_bytes());
        body.extend_from_slice(&(MxClass::Cell as u32).to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&MI_INT32.to_le_bytes());
        body.extend_from_slice(&16u32.to_le_bytes());
        for _ in 0..4 {
            body.extend_from_slice(&i32::MAX.to_le_bytes());
        }
        body.extend_from_slice(&((1u32 << 16) | MI_INT8).to_le_bytes());
        body.extend_from_slice(&[b'c', 0, 0, 0]);

        bytes.extend_from_slice(&MI_MATRIX.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);

        let err = read_mat(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::MatFile(ref m) if m.contains("too large")));

        let array = MatArray::Struct {
            dims: vec![usize::MAX, 2],
            fields: vec!["a".to_string()],
            values: Vec::new(),
        };
        assert!(from_mat_array(array, true).is_err());
    }

    #[test]
    fn test_compressed_element() {
        let plain = encode_mat(&[("obj", &Value::Float(2.5))]).unwrap();
        let element = &plain[HEADER_LEN..];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(element).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut bytes = plain[..HEADER_LEN].to_vec();
        bytes.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let (name, array) = read_mat(&bytes).unwrap().remove(0);
        assert_eq!(name, "obj");
        assert_eq!(from_mat_array(array, false).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_multi_row_char() {
        // ["ab"; "cd"] stored column-major: a c b d
        let array = MatArray::Char {
            dims: vec![2, 2],
            units: "acbd".encode_utf16().collect(),
        };
        assert_eq!(
            from_mat_array(array, true).unwrap(),
            Value::Seq(vec![Value::str("ab"), Value::str("cd")])
        );
    }

    #[test]
    fn test_truncated_file() {
        let bytes = encode_mat(&[("obj", &Value::Float(1.0))]).unwrap();
        let err = read_mat(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, CodecError::MatFile(_)));
    }

    #[test]
    fn test_load_variable_missing_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.mat");
        fs::write(&path, encode_mat(&[("obj", &Value::Int(3))]).unwrap()).unwrap();
        assert!(load_variable(&path, "other").is_err());
        let v = load_variable(&path, "obj").unwrap();
        assert_eq!(
            v,
            Value::Array(NdArray::new(vec![1, 1], ArrayData::Int64(vec![3])).unwrap())
        );
    }
}
