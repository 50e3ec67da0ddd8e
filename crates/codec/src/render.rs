//! Host value -> target expression
//!
//! `Renderer::render` turns a [`Value`] into MATLAB/Octave source text that
//! evaluates to the equivalent target value. Small values become literals;
//! mappings, matrices, N-D arrays and tables are staged to a file and the
//! expression loads that file.
//!
//! # Rules
//!
//! | value            | expression                                              |
//! |------------------|---------------------------------------------------------|
//! | `Bool`           | `true` / `false`                                        |
//! | `Int`, `Float`   | `42`, `0.1`, `Inf`, `-Inf`, `NaN`                       |
//! | `Str`            | `'it''s'`, `['a' char(10) 'b']`                         |
//! | `Complex`        | `(1.0+2.0i)`, `complex(Inf, 1.0)`                       |
//! | `Null`           | `NaN`                                                   |
//! | `Seq`            | `[]`, `[a;b;c]` when homogeneous, else `{a;b;c}`        |
//! | `Set`            | `{a,b}`                                                 |
//! | `Map`            | `getfield(load(fullfile('<dir>','<file>')), 'obj')`     |
//! | `Scalar`         | literal at its own precision                            |
//! | `Matrix`         | `cell2mat(struct2cell(load(fullfile(...))))`            |
//! | `Array`          | `matbridge_load_array(fullfile(...))`                   |
//! | `Table`          | `dataframe('<path>')` / `readtable('<path>')`           |

use crate::delimited;
use crate::error::CodecError;
use crate::matfile;
use crate::staging::{StagedFile, StagingDir};
use matbridge_core::{Complex64, Scalar, Value};
use std::fmt;
use tracing::debug;

/// Name of the variable every staged MAT file stores its value under
pub const STAGED_VAR: &str = "obj";

/// Target language flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Matlab,
    Octave,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Matlab => "MATLAB",
            Dialect::Octave => "Octave",
        }
    }

    fn table_prefix(&self) -> &'static str {
        match self {
            Dialect::Matlab => "df2mtlb-",
            Dialect::Octave => "df2oct-",
        }
    }

    fn table_reader(&self) -> &'static str {
        match self {
            Dialect::Matlab => "readtable",
            Dialect::Octave => "dataframe",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Literals
// ============================================================================

/// Single-quoted char literal with embedded quotes doubled
///
/// Control characters cannot appear inside a char literal, so they are
/// spliced in as `char(N)` and the pieces concatenated: `['a' char(10) 'b']`.
pub fn quote_str(s: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();
    for c in s.chars() {
        if c.is_control() {
            if !run.is_empty() {
                parts.push(format!("'{}'", std::mem::take(&mut run)));
            }
            parts.push(format!("char({})", c as u32));
        } else if c == '\'' {
            run.push_str("''");
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() || parts.is_empty() {
        parts.push(format!("'{}'", run));
    }
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("[{}]", parts.join(" "))
    }
}

/// Real number literal; Rust's shortest round-trip text, or `Inf`/`NaN`
pub fn format_real(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{:?}", x)
    }
}

fn format_single(x: f32) -> String {
    if x.is_finite() {
        format!("{:?}", x)
    } else {
        format_real(x as f64)
    }
}

pub fn format_complex(c: &Complex64) -> String {
    if !c.is_finite() {
        return format!("complex({}, {})", format_real(c.re), format_real(c.im));
    }
    let sign = if c.im.is_sign_negative() { '-' } else { '+' };
    format!(
        "({}{}{}i)",
        format_real(c.re),
        sign,
        format_real(c.im.abs())
    )
}

fn format_scalar(s: &Scalar) -> String {
    match *s {
        Scalar::Int8(n) => n.to_string(),
        Scalar::Int16(n) => n.to_string(),
        Scalar::Int32(n) => n.to_string(),
        Scalar::Int64(n) => n.to_string(),
        Scalar::UInt8(n) => n.to_string(),
        Scalar::UInt16(n) => n.to_string(),
        Scalar::UInt32(n) => n.to_string(),
        Scalar::UInt64(n) => n.to_string(),
        Scalar::Float16(x) => format_single(x.to_f32()),
        Scalar::Float32(x) => format_single(x),
        Scalar::Float64(x) => format_real(x),
    }
}

// ============================================================================
// Homogeneity
// ============================================================================

/// Whether a sequence can be written as a rectangular `[...]` literal
///
/// If the first item is an int or float, every item must be an int, float
/// or bool. Otherwise every item must be the same kind as the first;
/// strings must also have the same length (rows of a char matrix),
/// fixed-width scalars the same dtype, and containers, arrays and tables
/// never qualify.
pub fn is_homogeneous(items: &[Value]) -> bool {
    let Some(first) = items.first() else {
        return true;
    };
    match first {
        Value::Int(_) | Value::Float(_) => items
            .iter()
            .all(|v| matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))),
        Value::Str(s) => {
            let len = s.chars().count();
            items
                .iter()
                .all(|v| matches!(v, Value::Str(t) if t.chars().count() == len))
        }
        Value::Seq(_)
        | Value::Map(_)
        | Value::Set(_)
        | Value::Matrix(_)
        | Value::Array(_)
        | Value::Table(_) => false,
        // Concatenating mixed widths converts every item to one class
        Value::Scalar(s) => {
            let dtype = s.dtype();
            items
                .iter()
                .all(|v| matches!(v, Value::Scalar(t) if t.dtype() == dtype))
        }
        Value::Null | Value::Bool(_) | Value::Complex(_) => items
            .iter()
            .all(|v| std::mem::discriminant(v) == std::mem::discriminant(first)),
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Renders host values for one target dialect, staging through one directory
#[derive(Debug, Clone)]
pub struct Renderer<'a> {
    staging: &'a StagingDir,
    dialect: Dialect,
}

impl<'a> Renderer<'a> {
    pub fn new(staging: &'a StagingDir, dialect: Dialect) -> Self {
        Renderer { staging, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Target expression that evaluates to `value`
    pub fn render(&self, value: &Value) -> Result<String, CodecError> {
        let expr = match value {
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format_real(*x),
            Value::Str(s) => quote_str(s),
            Value::Complex(c) => format_complex(c),
            Value::Null => "NaN".to_string(),
            Value::Seq(items) => {
                if items.is_empty() {
                    return Ok("[]".to_string());
                }
                let parts = self.render_all(items)?;
                if is_homogeneous(items) {
                    format!("[{}]", parts.join(";"))
                } else {
                    format!("{{{}}}", parts.join(";"))
                }
            }
            Value::Set(items) => format!("{{{}}}", self.render_all(items)?.join(",")),
            Value::Map(_) => {
                let staged = self.stage_mat("dict2mtlb-", value)?;
                format!("getfield(load({}), '{}')", fullfile(&staged), STAGED_VAR)
            }
            Value::Scalar(s) => format_scalar(s),
            Value::Matrix(_) => {
                let staged = self.stage_mat("mat2mtlb-", value)?;
                format!("cell2mat(struct2cell(load({})))", fullfile(&staged))
            }
            Value::Array(_) => {
                let staged = self.stage_mat("ary2mtlb-", value)?;
                format!("matbridge_load_array({})", fullfile(&staged))
            }
            Value::Table(table) => {
                let text = delimited::write_table(table)?;
                let staged =
                    self.staging
                        .stage(self.dialect.table_prefix(), ".csv", text.as_bytes())?;
                let path = staged.path().to_string_lossy();
                format!("{}({})", self.dialect.table_reader(), quote_str(&path))
            }
        };
        debug!("Rendered {} as {}", value.type_name(), expr);
        Ok(expr)
    }

    fn render_all(&self, items: &[Value]) -> Result<Vec<String>, CodecError> {
        items.iter().map(|v| self.render(v)).collect()
    }

    fn stage_mat(&self, prefix: &str, value: &Value) -> Result<StagedFile, CodecError> {
        let bytes = matfile::encode_mat(&[(STAGED_VAR, value)])?;
        self.staging.stage(prefix, ".mat", &bytes)
    }
}

/// `fullfile('<dir>','<file>')` for a staged file
fn fullfile(staged: &StagedFile) -> String {
    format!(
        "fullfile({},{})",
        quote_str(&staged.dir()),
        quote_str(&staged.file_name())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use matbridge_core::{ArrayData, NdArray};

    fn with_renderer<T>(dialect: Dialect, f: impl FnOnce(&Renderer<'_>, &StagingDir) -> T) -> T {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingDir::new(tmp.path()).unwrap();
        let renderer = Renderer::new(&staging, dialect);
        f(&renderer, &staging)
    }

    fn render(value: &Value) -> String {
        with_renderer(Dialect::Octave, |r, _| r.render(value).unwrap())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(render(&Value::Bool(true)), "true");
        assert_eq!(render(&Value::Int(-7)), "-7");
        assert_eq!(render(&Value::Float(0.1)), "0.1");
        assert_eq!(render(&Value::Float(3.0)), "3.0");
        assert_eq!(render(&Value::Float(f64::NEG_INFINITY)), "-Inf");
        assert_eq!(render(&Value::Null), "NaN");
        assert_eq!(render(&Value::Scalar(Scalar::Float32(0.1))), "0.1");
        assert_eq!(render(&Value::Scalar(Scalar::UInt8(255))), "255");
    }

    #[test]
    fn test_strings() {
        assert_eq!(render(&Value::str("abc")), "'abc'");
        assert_eq!(render(&Value::str("it's")), "'it''s'");
        assert_eq!(render(&Value::str("")), "''");
        assert_eq!(render(&Value::str("a\nb")), "['a' char(10) 'b']");
        assert_eq!(render(&Value::str("\t")), "char(9)");
    }

    #[test]
    fn test_complex() {
        assert_eq!(render(&Value::Complex(Complex64::new(1.0, 2.0))), "(1.0+2.0i)");
        assert_eq!(render(&Value::Complex(Complex64::new(1.0, -2.0))), "(1.0-2.0i)");
        assert_eq!(
            render(&Value::Complex(Complex64::new(f64::INFINITY, 1.0))),
            "complex(Inf, 1.0)"
        );
    }

    #[test]
    fn test_sequences() {
        assert_eq!(render(&Value::Seq(vec![])), "[]");
        assert_eq!(
            render(&Value::Seq(vec![Value::Int(1), Value::Float(2.5), Value::Bool(true)])),
            "[1;2.5;true]"
        );
        assert_eq!(
            render(&Value::Seq(vec![Value::Int(1), Value::str("a")])),
            "{1;'a'}"
        );
        assert_eq!(
            render(&Value::Seq(vec![Value::str("ab"), Value::str("cd")])),
            "['ab';'cd']"
        );
        assert_eq!(
            render(&Value::Seq(vec![Value::str("ab"), Value::str("c")])),
            "{'ab';'c'}"
        );
        assert_eq!(
            render(&Value::Seq(vec![Value::Seq(vec![Value::Int(1)])])),
            "{[1]}"
        );
    }

    #[test]
    fn test_mixed_scalar_dtypes_use_cell() {
        let mixed = vec![
            Value::Scalar(Scalar::Int8(1)),
            Value::Scalar(Scalar::Float64(2.5)),
        ];
        assert!(!is_homogeneous(&mixed));
        assert_eq!(render(&Value::Seq(mixed)), "{1;2.5}");

        let widths = vec![
            Value::Scalar(Scalar::UInt8(200)),
            Value::Scalar(Scalar::Int8(-1)),
        ];
        assert_eq!(render(&Value::Seq(widths)), "{200;-1}");

        let same = vec![
            Value::Scalar(Scalar::Int16(3)),
            Value::Scalar(Scalar::Int16(-4)),
        ];
        assert_eq!(render(&Value::Seq(same)), "[3;-4]");
    }

    #[test]
    fn test_bool_first_is_not_numeric() {
        assert!(!is_homogeneous(&[Value::Bool(true), Value::Int(1)]));
        assert!(is_homogeneous(&[Value::Bool(true), Value::Bool(false)]));
    }

    #[test]
    fn test_set() {
        assert_eq!(render(&Value::set(vec![])), "{}");
        assert_eq!(
            render(&Value::set(vec![Value::Int(1), Value::Int(2)])),
            "{1,2}"
        );
    }

    #[test]
    fn test_map_is_staged() {
        with_renderer(Dialect::Matlab, |r, staging| {
            let expr = r.render(&Value::map([("a", Value::Int(1))])).unwrap();
            let dir = quote_str(&staging.path().to_string_lossy());
            assert!(expr.starts_with(&format!("getfield(load(fullfile({},'dict2mtlb-", dir)));
            assert!(expr.ends_with(".mat')), 'obj')"));
        });
    }

    #[test]
    fn test_staged_files_are_distinct() {
        with_renderer(Dialect::Octave, |r, staging| {
            let m = NdArray::new(vec![1, 2], ArrayData::Float64(vec![1.0, 2.0])).unwrap();
            let a = r.render(&Value::Matrix(m.clone())).unwrap();
            let b = r.render(&Value::Matrix(m)).unwrap();
            assert_ne!(a, b);
            assert!(a.starts_with("cell2mat(struct2cell(load(fullfile("));
            assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 2);
        });
    }

    #[test]
    fn test_array_uses_companion_loader() {
        let a = NdArray::new(vec![2, 2, 2], ArrayData::Int8(vec![0; 8])).unwrap();
        let expr = render(&Value::Array(a));
        assert!(expr.starts_with("matbridge_load_array(fullfile("));
        assert!(expr.contains("'ary2mtlb-"));
    }

    #[test]
    fn test_table_reader_per_dialect() {
        use matbridge_core::{Column, Table};
        let t = Table::new(vec![Column::new("x", vec![Value::Int(1)])]).unwrap();
        with_renderer(Dialect::Octave, |r, _| {
            let expr = r.render(&Value::Table(t.clone())).unwrap();
            assert!(expr.starts_with("dataframe('"));
            assert!(expr.contains("df2oct-"));
        });
        with_renderer(Dialect::Matlab, |r, _| {
            let expr = r.render(&Value::Table(t.clone())).unwrap();
            assert!(expr.starts_with("readtable('"));
            assert!(expr.contains("df2mtlb-"));
        });
    }

    #[test]
    fn test_unsupported_map_key() {
        with_renderer(Dialect::Octave, |r, _| {
            let err = r
                .render(&Value::map([("not a field", Value::Int(1))]))
                .unwrap_err();
            assert!(err.is_unsupported());
        });
    }
}
