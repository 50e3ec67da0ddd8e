//! Value: what the two kernels exchange
//!
//! A closed sum type over every kind of host value the bridge knows how to
//! move. Code that consumes a `Value` matches exhaustively, so adding a kind
//! is a compile error everywhere it needs handling.
//!
//! `Display` prints the host-literal form (`None`, `True`, `(1+2j)`,
//! `{'a': 1}`, `np.array([...], dtype='int8')`), the same grammar the
//! literal parser accepts back.

use crate::array::{ArrayData, Complex64, Dtype, Element, NdArray};
use crate::table::Table;
use half::f16;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// MapKey: hashable subset of Value usable as mapping keys
///
/// Floats are excluded because of NaN equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl MapKey {
    /// Try to convert a Value to a MapKey
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Int(n) => Some(MapKey::Int(*n)),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Str(s) => Some(MapKey::Str(s.clone())),
            _ => None,
        }
    }

    /// Convert MapKey back to Value
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Str(s) => Value::Str(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(s.to_string())
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

/// Insertion-ordered mapping
///
/// Field order matters on the target side (struct fields print in the
/// order they were created), so entries keep the order of first insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(MapKey, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Mapping::default()
    }

    /// Insert or replace; a replaced key keeps its original position
    pub fn insert(&mut self, key: MapKey, value: Value) -> Option<Value> {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a string key
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(MapKey, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (MapKey, Value)>>(iter: I) -> Self {
        let mut map = Mapping::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// JSON objects only take string keys, so keys serialize through Display
impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            match k {
                MapKey::Str(s) => map.serialize_entry(s, v)?,
                other => map.serialize_entry(&other.to_string(), v)?,
            }
        }
        map.end()
    }
}

/// A fixed-width numeric scalar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "dtype", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float16(f16),
    Float32(f32),
    Float64(f64),
}

impl Scalar {
    pub fn dtype(&self) -> Dtype {
        match self {
            Scalar::Int8(_) => Dtype::Int8,
            Scalar::Int16(_) => Dtype::Int16,
            Scalar::Int32(_) => Dtype::Int32,
            Scalar::Int64(_) => Dtype::Int64,
            Scalar::UInt8(_) => Dtype::UInt8,
            Scalar::UInt16(_) => Dtype::UInt16,
            Scalar::UInt32(_) => Dtype::UInt32,
            Scalar::UInt64(_) => Dtype::UInt64,
            Scalar::Float16(_) => Dtype::Float16,
            Scalar::Float32(_) => Dtype::Float32,
            Scalar::Float64(_) => Dtype::Float64,
        }
    }

    /// Build a scalar of the given dtype from a widened element
    ///
    /// Returns `None` for dtypes with no fixed-width scalar form (bool and
    /// complex map to `Value::Bool` / `Value::Complex`) and for values that
    /// do not convert.
    pub fn from_element(dtype: Dtype, element: Element) -> Option<Scalar> {
        if matches!(dtype, Dtype::Bool | Dtype::Complex128) {
            return None;
        }
        let data = ArrayData::from_elements(dtype, &[element]).ok()?;
        let scalar = match data {
            ArrayData::Int8(v) => Scalar::Int8(v[0]),
            ArrayData::Int16(v) => Scalar::Int16(v[0]),
            ArrayData::Int32(v) => Scalar::Int32(v[0]),
            ArrayData::Int64(v) => Scalar::Int64(v[0]),
            ArrayData::UInt8(v) => Scalar::UInt8(v[0]),
            ArrayData::UInt16(v) => Scalar::UInt16(v[0]),
            ArrayData::UInt32(v) => Scalar::UInt32(v[0]),
            ArrayData::UInt64(v) => Scalar::UInt64(v[0]),
            ArrayData::Float16(v) => Scalar::Float16(v[0]),
            ArrayData::Float32(v) => Scalar::Float32(v[0]),
            ArrayData::Float64(v) => Scalar::Float64(v[0]),
            ArrayData::Bool(_) | ArrayData::Complex128(_) => return None,
        };
        Some(scalar)
    }

    /// Widened view
    pub fn element(&self) -> Element {
        match *self {
            Scalar::Int8(n) => Element::Int(n as i128),
            Scalar::Int16(n) => Element::Int(n as i128),
            Scalar::Int32(n) => Element::Int(n as i128),
            Scalar::Int64(n) => Element::Int(n as i128),
            Scalar::UInt8(n) => Element::Int(n as i128),
            Scalar::UInt16(n) => Element::Int(n as i128),
            Scalar::UInt32(n) => Element::Int(n as i128),
            Scalar::UInt64(n) => Element::Int(n as i128),
            Scalar::Float16(x) => Element::Float(x.to_f64()),
            Scalar::Float32(x) => Element::Float(x as f64),
            Scalar::Float64(x) => Element::Float(x),
        }
    }
}

/// Value: a host variable being exchanged
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Missing value (`None`)
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex64),
    Str(String),
    /// Ordered sequence (lists and tuples)
    Seq(Vec<Value>),
    Map(Mapping),
    /// Unordered collection without duplicates
    Set(Vec<Value>),
    /// Fixed-width numeric scalar
    Scalar(Scalar),
    /// Two-dimensional numeric matrix
    Matrix(NdArray),
    /// N-dimensional numeric array
    Array(NdArray),
    /// Rows by named columns
    Table(Table),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Build a set, dropping duplicates while keeping first-seen order
    pub fn set(items: impl IntoIterator<Item = Value>) -> Value {
        let mut unique: Vec<Value> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value::Set(unique)
    }

    /// Build a mapping with string keys
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (MapKey::Str(k.into()), v))
                .collect(),
        )
    }

    /// Host-side type name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Str(_) => "str",
            Value::Seq(_) => "list",
            Value::Map(_) => "dict",
            Value::Set(_) => "set",
            Value::Scalar(s) => s.dtype().name(),
            Value::Matrix(_) => "matrix",
            Value::Array(_) => "ndarray",
            Value::Table(_) => "DataFrame",
        }
    }

    /// Numeric element view for scalar numbers, `None` otherwise
    pub fn as_element(&self) -> Option<Element> {
        match self {
            Value::Bool(b) => Some(Element::Bool(*b)),
            Value::Int(n) => Some(Element::Int(*n as i128)),
            Value::Float(x) => Some(Element::Float(*x)),
            Value::Complex(c) => Some(Element::Complex(*c)),
            Value::Scalar(s) => Some(s.element()),
            _ => None,
        }
    }

    /// Whether the value is a single cell-sized item (usable in a table)
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Str(_)
                | Value::Scalar(_)
        )
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

// ============================================================================
// Host-literal formatting
// ============================================================================

/// Float text with a decimal point or exponent, so it never reads as an int
pub fn format_host_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format!("{:?}", x)
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() {
        f.write_str(&format_host_float(x))
    } else if x.is_nan() {
        f.write_str("float('nan')")
    } else if x > 0.0 {
        f.write_str("float('inf')")
    } else {
        f.write_str("-float('inf')")
    }
}

fn write_complex(f: &mut fmt::Formatter<'_>, c: &Complex64) -> fmt::Result {
    if !c.is_finite() {
        f.write_str("complex(")?;
        write_float(f, c.re)?;
        f.write_str(", ")?;
        write_float(f, c.im)?;
        return f.write_str(")");
    }
    let sign = if c.im.is_sign_negative() { '-' } else { '+' };
    write!(
        f,
        "({}{}{}j)",
        format_host_float(c.re),
        sign,
        format_host_float(c.im.abs())
    )
}

/// Quote a string with single quotes and backslash escapes
pub fn quote_host_str(s: &str) -> String {
    let mut buf = String::with_capacity(s.len() + 2);
    buf.push('\'');
    for c in s.chars() {
        match c {
            '\'' => buf.push_str("\\'"),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if c.is_control() => buf.push_str(&format!("\\x{:02x}", c as u32)),
            c => buf.push(c),
        }
    }
    buf.push('\'');
    buf
}

fn write_element(f: &mut fmt::Formatter<'_>, element: Element) -> fmt::Result {
    match element {
        Element::Bool(b) => f.write_str(if b { "True" } else { "False" }),
        Element::Int(n) => write!(f, "{}", n),
        Element::Float(x) => write_float(f, x),
        Element::Complex(c) => write_complex(f, &c),
    }
}

/// Nested list text for a row-major buffer
fn write_nested(
    f: &mut fmt::Formatter<'_>,
    data: &ArrayData,
    shape: &[usize],
    offset: usize,
) -> fmt::Result {
    let Some((&first, rest)) = shape.split_first() else {
        return match data.element(offset) {
            Some(e) => write_element(f, e),
            None => Ok(()),
        };
    };
    let stride: usize = rest.iter().product();
    f.write_str("[")?;
    for i in 0..first {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_nested(f, data, rest, offset + i * stride)?;
    }
    f.write_str("]")
}

fn write_array(f: &mut fmt::Formatter<'_>, ctor: &str, array: &NdArray) -> fmt::Result {
    write!(f, "{}(", ctor)?;
    write_nested(f, array.data(), array.shape(), 0)?;
    match array.dtype() {
        Dtype::Bool | Dtype::Int64 | Dtype::Float64 | Dtype::Complex128 => f.write_str(")"),
        other => write!(f, ", dtype='{}')", other),
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write_float(f, *x),
            Value::Complex(c) => write_complex(f, c),
            Value::Str(s) => f.write_str(&quote_host_str(s)),
            Value::Seq(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Set(items) => {
                if items.is_empty() {
                    return f.write_str("set()");
                }
                f.write_str("{")?;
                write_items(f, items)?;
                f.write_str("}")
            }
            Value::Scalar(s) => {
                write!(f, "np.{}(", s.dtype())?;
                write_element(f, s.element())?;
                f.write_str(")")
            }
            Value::Matrix(m) => write_array(f, "np.matrix", m),
            Value::Array(a) => write_array(f, "np.array", a),
            Value::Table(t) => write!(
                f,
                "<DataFrame {} rows x {} columns>",
                t.num_rows(),
                t.num_columns()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Int(-123).to_string(), "-123");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(f64::NAN).to_string(), "float('nan')");
    }

    #[test]
    fn test_display_complex() {
        assert_eq!(Value::Complex(Complex64::new(2.0, 3.0)).to_string(), "(2.0+3.0j)");
        assert_eq!(
            Value::Complex(Complex64::new(1.0, -2.5)).to_string(),
            "(1.0-2.5j)"
        );
    }

    #[test]
    fn test_display_string_escaping() {
        assert_eq!(Value::str("it's").to_string(), r"'it\'s'");
        assert_eq!(Value::str("a\tb").to_string(), r"'a\tb'");
    }

    #[test]
    fn test_display_containers() {
        let v = Value::map([("a", Value::Int(1)), ("b", Value::str("2"))]);
        assert_eq!(v.to_string(), "{'a': 1, 'b': '2'}");
        assert_eq!(Value::set(vec![]).to_string(), "set()");
        assert_eq!(
            Value::Seq(vec![Value::Float(1.4), Value::Bool(true)]).to_string(),
            "[1.4, True]"
        );
    }

    #[test]
    fn test_display_matrix() {
        let m = NdArray::new(vec![2, 2], ArrayData::Int32(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(
            Value::Matrix(m).to_string(),
            "np.matrix([[1, 2], [3, 4]], dtype='int32')"
        );
    }

    #[test]
    fn test_set_dedupes() {
        let v = Value::set(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        assert_eq!(v, Value::Set(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_mapping_replace_keeps_position() {
        let mut m = Mapping::new();
        m.insert("a".into(), Value::Int(1));
        m.insert("b".into(), Value::Int(2));
        assert_eq!(m.insert("a".into(), Value::Int(3)), Some(Value::Int(1)));
        let keys: Vec<_> = m.keys().cloned().collect();
        assert_eq!(keys, vec![MapKey::from("a"), MapKey::from("b")]);
        assert_eq!(m.field("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_scalar_from_element() {
        assert_eq!(
            Scalar::from_element(Dtype::UInt8, Element::Int(200)),
            Some(Scalar::UInt8(200))
        );
        assert_eq!(Scalar::from_element(Dtype::UInt8, Element::Int(-1)), None);
        assert_eq!(Scalar::from_element(Dtype::Bool, Element::Int(1)), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "NoneType");
        assert_eq!(Value::Scalar(Scalar::Int16(3)).type_name(), "int16");
        assert_eq!(
            Value::Array(NdArray::from_f64(vec![1], vec![1.0]).unwrap()).type_name(),
            "ndarray"
        );
    }

    #[test]
    fn test_json_serialization() {
        let v = Value::map([("x", Value::Int(1))]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"type":"map","value":{"x":{"type":"int","value":1}}}"#);
    }
}
