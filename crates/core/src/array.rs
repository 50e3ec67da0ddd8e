//! Typed N-dimensional numeric arrays
//!
//! Buffers are stored row-major (last axis varies fastest), which is the
//! layout a numeric host hands over by default. The MAT container used for
//! staging is column-major; the codec reorders when it writes and reads.
//!
//! # Element conversion
//!
//! Every typed buffer can be viewed element-by-element through [`Element`],
//! a widened number (bool, i128, f64 or complex). Casting goes through the
//! same widening so `np.array([1, 2], dtype='int8')` and a staged `int8`
//! array end up with identical buffers.

use half::f16;
use serde::Serialize;
use std::fmt;

/// A double-precision complex number
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    pub fn new(re: f64, im: f64) -> Self {
        Complex64 { re, im }
    }

    pub fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Element type of an array or a fixed-width scalar
///
/// Names follow the numeric host's dtype spelling (`int8`, `float32`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex128,
}

impl Dtype {
    /// Canonical dtype name
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::UInt8 => "uint8",
            Dtype::UInt16 => "uint16",
            Dtype::UInt32 => "uint32",
            Dtype::UInt64 => "uint64",
            Dtype::Float16 => "float16",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
            Dtype::Complex128 => "complex128",
        }
    }

    /// Resolve a dtype name, accepting the common aliases
    pub fn from_name(name: &str) -> Option<Dtype> {
        let dtype = match name {
            "bool" | "bool_" | "logical" => Dtype::Bool,
            "int8" => Dtype::Int8,
            "int16" => Dtype::Int16,
            "int32" | "intc" => Dtype::Int32,
            "int64" | "int" | "intp" => Dtype::Int64,
            "uint8" => Dtype::UInt8,
            "uint16" => Dtype::UInt16,
            "uint32" => Dtype::UInt32,
            "uint64" => Dtype::UInt64,
            "float16" | "half" => Dtype::Float16,
            "float32" | "single" => Dtype::Float32,
            "float64" | "float" | "double" => Dtype::Float64,
            "complex128" | "complex" => Dtype::Complex128,
            _ => return None,
        };
        Some(dtype)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Dtype::Int8
                | Dtype::Int16
                | Dtype::Int32
                | Dtype::Int64
                | Dtype::UInt8
                | Dtype::UInt16
                | Dtype::UInt32
                | Dtype::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Dtype::Float16 | Dtype::Float32 | Dtype::Float64)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Widened view of a single array element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element {
    Bool(bool),
    Int(i128),
    Float(f64),
    Complex(Complex64),
}

impl Element {
    fn as_f64(&self) -> Result<f64, ArrayError> {
        match *self {
            Element::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
            Element::Int(n) => Ok(n as f64),
            Element::Float(x) => Ok(x),
            Element::Complex(c) => {
                if c.im == 0.0 {
                    Ok(c.re)
                } else {
                    Err(ArrayError::ComplexToReal)
                }
            }
        }
    }

    fn as_i128(&self) -> Result<i128, ArrayError> {
        match *self {
            Element::Bool(b) => Ok(b as i128),
            Element::Int(n) => Ok(n),
            Element::Float(x) => {
                if x.is_finite() {
                    Ok(x.trunc() as i128)
                } else {
                    Err(ArrayError::NonFiniteToInteger(x))
                }
            }
            Element::Complex(_) => {
                let x = self.as_f64()?;
                Element::Float(x).as_i128()
            }
        }
    }

    fn as_bool(&self) -> Result<bool, ArrayError> {
        match *self {
            Element::Bool(b) => Ok(b),
            Element::Int(n) => Ok(n != 0),
            Element::Float(x) => Ok(x != 0.0),
            Element::Complex(c) => Ok(c.re != 0.0 || c.im != 0.0),
        }
    }

    fn as_complex(&self) -> Complex64 {
        match *self {
            Element::Complex(c) => c,
            Element::Bool(b) => Complex64::new(if b { 1.0 } else { 0.0 }, 0.0),
            Element::Int(n) => Complex64::new(n as f64, 0.0),
            Element::Float(x) => Complex64::new(x, 0.0),
        }
    }
}

/// Errors raised while building or casting arrays
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayError {
    /// Shape product does not match buffer length
    ShapeMismatch { expected: usize, actual: usize },
    /// Nested data is not rectangular
    Ragged,
    /// Integer value does not fit the requested dtype
    Overflow { value: i128, dtype: Dtype },
    /// NaN or infinity cast to an integer dtype
    NonFiniteToInteger(f64),
    /// Complex value with a nonzero imaginary part cast to a real dtype
    ComplexToReal,
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayError::ShapeMismatch { expected, actual } => write!(
                f,
                "shape holds {} elements but the buffer has {}",
                expected, actual
            ),
            ArrayError::Ragged => write!(f, "nested sequences are not rectangular"),
            ArrayError::Overflow { value, dtype } => {
                write!(f, "{} does not fit in {}", value, dtype)
            }
            ArrayError::NonFiniteToInteger(x) => {
                write!(f, "cannot convert {} to an integer", x)
            }
            ArrayError::ComplexToReal => {
                write!(f, "cannot discard the imaginary part of a complex value")
            }
        }
    }
}

impl std::error::Error for ArrayError {}

/// Typed, row-major element buffer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Complex128(Vec<Complex64>),
}

/// Convert widened elements into one integer buffer, checking the range
fn narrow_ints<T: TryFrom<i128>>(
    elements: &[Element],
    dtype: Dtype,
) -> Result<Vec<T>, ArrayError> {
    elements
        .iter()
        .map(|e| {
            let value = e.as_i128()?;
            T::try_from(value).map_err(|_| ArrayError::Overflow { value, dtype })
        })
        .collect()
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int8(v) => v.len(),
            ArrayData::Int16(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::UInt8(v) => v.len(),
            ArrayData::UInt16(v) => v.len(),
            ArrayData::UInt32(v) => v.len(),
            ArrayData::UInt64(v) => v.len(),
            ArrayData::Float16(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
            ArrayData::Complex128(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            ArrayData::Bool(_) => Dtype::Bool,
            ArrayData::Int8(_) => Dtype::Int8,
            ArrayData::Int16(_) => Dtype::Int16,
            ArrayData::Int32(_) => Dtype::Int32,
            ArrayData::Int64(_) => Dtype::Int64,
            ArrayData::UInt8(_) => Dtype::UInt8,
            ArrayData::UInt16(_) => Dtype::UInt16,
            ArrayData::UInt32(_) => Dtype::UInt32,
            ArrayData::UInt64(_) => Dtype::UInt64,
            ArrayData::Float16(_) => Dtype::Float16,
            ArrayData::Float32(_) => Dtype::Float32,
            ArrayData::Float64(_) => Dtype::Float64,
            ArrayData::Complex128(_) => Dtype::Complex128,
        }
    }

    /// Widened element at a linear (row-major) index
    pub fn element(&self, index: usize) -> Option<Element> {
        let element = match self {
            ArrayData::Bool(v) => Element::Bool(*v.get(index)?),
            ArrayData::Int8(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::Int16(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::Int32(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::Int64(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::UInt8(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::UInt16(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::UInt32(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::UInt64(v) => Element::Int(*v.get(index)? as i128),
            ArrayData::Float16(v) => Element::Float(v.get(index)?.to_f64()),
            ArrayData::Float32(v) => Element::Float(*v.get(index)? as f64),
            ArrayData::Float64(v) => Element::Float(*v.get(index)?),
            ArrayData::Complex128(v) => Element::Complex(*v.get(index)?),
        };
        Some(element)
    }

    /// All elements, widened, in buffer order
    pub fn elements(&self) -> Vec<Element> {
        (0..self.len()).filter_map(|i| self.element(i)).collect()
    }

    /// Build a typed buffer from widened elements
    pub fn from_elements(dtype: Dtype, elements: &[Element]) -> Result<Self, ArrayError> {
        let data = match dtype {
            Dtype::Bool => ArrayData::Bool(
                elements
                    .iter()
                    .map(|e| e.as_bool())
                    .collect::<Result<_, _>>()?,
            ),
            Dtype::Int8 => ArrayData::Int8(narrow_ints(elements, dtype)?),
            Dtype::Int16 => ArrayData::Int16(narrow_ints(elements, dtype)?),
            Dtype::Int32 => ArrayData::Int32(narrow_ints(elements, dtype)?),
            Dtype::Int64 => ArrayData::Int64(narrow_ints(elements, dtype)?),
            Dtype::UInt8 => ArrayData::UInt8(narrow_ints(elements, dtype)?),
            Dtype::UInt16 => ArrayData::UInt16(narrow_ints(elements, dtype)?),
            Dtype::UInt32 => ArrayData::UInt32(narrow_ints(elements, dtype)?),
            Dtype::UInt64 => ArrayData::UInt64(narrow_ints(elements, dtype)?),
            Dtype::Float16 => ArrayData::Float16(
                elements
                    .iter()
                    .map(|e| e.as_f64().map(f16::from_f64))
                    .collect::<Result<_, _>>()?,
            ),
            Dtype::Float32 => ArrayData::Float32(
                elements
                    .iter()
                    .map(|e| e.as_f64().map(|x| x as f32))
                    .collect::<Result<_, _>>()?,
            ),
            Dtype::Float64 => ArrayData::Float64(
                elements
                    .iter()
                    .map(|e| e.as_f64())
                    .collect::<Result<_, _>>()?,
            ),
            Dtype::Complex128 => {
                ArrayData::Complex128(elements.iter().map(|e| e.as_complex()).collect())
            }
        };
        Ok(data)
    }

    /// Reorder the buffer; `order[i]` is the source index of output slot `i`
    pub fn permuted(&self, order: &[usize]) -> ArrayData {
        fn pick<T: Copy>(v: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| v[i]).collect()
        }
        match self {
            ArrayData::Bool(v) => ArrayData::Bool(pick(v, order)),
            ArrayData::Int8(v) => ArrayData::Int8(pick(v, order)),
            ArrayData::Int16(v) => ArrayData::Int16(pick(v, order)),
            ArrayData::Int32(v) => ArrayData::Int32(pick(v, order)),
            ArrayData::Int64(v) => ArrayData::Int64(pick(v, order)),
            ArrayData::UInt8(v) => ArrayData::UInt8(pick(v, order)),
            ArrayData::UInt16(v) => ArrayData::UInt16(pick(v, order)),
            ArrayData::UInt32(v) => ArrayData::UInt32(pick(v, order)),
            ArrayData::UInt64(v) => ArrayData::UInt64(pick(v, order)),
            ArrayData::Float16(v) => ArrayData::Float16(pick(v, order)),
            ArrayData::Float32(v) => ArrayData::Float32(pick(v, order)),
            ArrayData::Float64(v) => ArrayData::Float64(pick(v, order)),
            ArrayData::Complex128(v) => ArrayData::Complex128(pick(v, order)),
        }
    }
}

/// An N-dimensional array: shape plus a row-major typed buffer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create an array, checking that the shape covers the buffer exactly
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, ArrayError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ArrayError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(NdArray { shape, data })
    }

    /// One-dimensional array over the whole buffer
    pub fn vector(data: ArrayData) -> Self {
        NdArray {
            shape: vec![data.len()],
            data,
        }
    }

    /// Convenience constructor for double arrays
    pub fn from_f64(shape: Vec<usize>, values: Vec<f64>) -> Result<Self, ArrayError> {
        NdArray::new(shape, ArrayData::Float64(values))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }

    /// Same shape, converted element type
    pub fn cast(&self, dtype: Dtype) -> Result<NdArray, ArrayError> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }
        let data = ArrayData::from_elements(dtype, &self.data.elements())?;
        Ok(NdArray {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Same buffer viewed with another shape of equal size
    pub fn reshaped(self, shape: Vec<usize>) -> Result<NdArray, ArrayError> {
        NdArray::new(shape, self.data)
    }
}

/// Row-major source index for every column-major slot of `shape`
///
/// Used to reorder a row-major buffer into the column-major layout (and,
/// inverted, back again).
pub fn column_major_order(shape: &[usize]) -> Vec<usize> {
    let total: usize = shape.iter().product();
    let ndim = shape.len();
    // Row-major strides
    let mut strides = vec![1usize; ndim];
    for axis in (0..ndim.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    let mut order = Vec::with_capacity(total);
    let mut index = vec![0usize; ndim];
    for _ in 0..total {
        order.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
        // Advance the column-major counter: first axis fastest
        for axis in 0..ndim {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    order
}

/// Inverse permutation of [`column_major_order`]
pub fn row_major_order(shape: &[usize]) -> Vec<usize> {
    let forward = column_major_order(shape);
    let mut inverse = vec![0usize; forward.len()];
    for (col_slot, &row_index) in forward.iter().enumerate() {
        inverse[row_index] = col_slot;
    }
    inverse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let err = NdArray::from_f64(vec![2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ArrayError::ShapeMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_column_major_order_matrix() {
        // [[1, 2, 3], [4, 5, 6]] stored row-major is 1 2 3 4 5 6;
        // column-major reads 1 4 2 5 3 6.
        assert_eq!(column_major_order(&[2, 3]), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_row_major_order_inverts() {
        let shape = [2, 3, 4];
        let forward = column_major_order(&shape);
        let back = row_major_order(&shape);
        for (slot, &src) in forward.iter().enumerate() {
            assert_eq!(back[src], slot);
        }
    }

    #[test]
    fn test_column_major_order_vector_is_identity() {
        assert_eq!(column_major_order(&[4]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cast_int_to_float() {
        let a = NdArray::vector(ArrayData::Int64(vec![1, -2, 3]));
        let b = a.cast(Dtype::Float64).unwrap();
        assert_eq!(b.data(), &ArrayData::Float64(vec![1.0, -2.0, 3.0]));
    }

    #[test]
    fn test_cast_overflow() {
        let a = NdArray::vector(ArrayData::Int64(vec![300]));
        let err = a.cast(Dtype::Int8).unwrap_err();
        assert_eq!(
            err,
            ArrayError::Overflow {
                value: 300,
                dtype: Dtype::Int8
            }
        );
    }

    #[test]
    fn test_cast_complex_to_real_fails() {
        let a = NdArray::vector(ArrayData::Complex128(vec![Complex64::new(1.0, 2.0)]));
        assert_eq!(
            a.cast(Dtype::Float64).unwrap_err(),
            ArrayError::ComplexToReal
        );
    }

    #[test]
    fn test_float_to_int_truncates() {
        let a = NdArray::vector(ArrayData::Float64(vec![2.9, -2.9]));
        let b = a.cast(Dtype::Int32).unwrap();
        assert_eq!(b.data(), &ArrayData::Int32(vec![2, -2]));
    }

    #[test]
    fn test_dtype_aliases() {
        assert_eq!(Dtype::from_name("double"), Some(Dtype::Float64));
        assert_eq!(Dtype::from_name("single"), Some(Dtype::Float32));
        assert_eq!(Dtype::from_name("bool_"), Some(Dtype::Bool));
        assert_eq!(Dtype::from_name("object"), None);
    }
}
