//! Comma-separated tables
//!
//! # Writing
//!
//! Tables go to the target as comma-separated text with a header row. Every
//! non-numeric field (column names and text cells) is wrapped in single
//! quotes with embedded quotes doubled; numbers are written bare, booleans
//! as `1`/`0`, missing values as an empty field.
//!
//! # Reading
//!
//! Tables written by the target come back through `writetable`, which
//! quotes with `"`. The reader takes the quote character as a parameter,
//! accepts quoted newlines and CRLF line ends, and infers one type per
//! column: int, then float, then bool, falling back to text. Empty unquoted
//! fields are missing values and do not take part in inference.

use crate::error::CodecError;
use matbridge_core::{Column, Element, Table, Value, format_host_float};

pub const SEPARATOR: char = ',';
pub const WRITE_QUOTE: char = '\'';

// ============================================================================
// Writer
// ============================================================================

fn quote(text: &str, q: char) -> String {
    let doubled: String = [q, q].iter().collect();
    format!("{q}{}{q}", text.replace(q, &doubled))
}

fn format_number(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format_host_float(x)
    }
}

fn format_cell(value: &Value) -> Result<String, CodecError> {
    let text = match value.as_element() {
        Some(Element::Bool(b)) => if b { "1" } else { "0" }.to_string(),
        Some(Element::Int(n)) => n.to_string(),
        Some(Element::Float(x)) => format_number(x),
        Some(Element::Complex(_)) => {
            return Err(CodecError::unsupported(
                "DataFrame",
                "complex cells cannot be written to a table",
            ));
        }
        None => match value {
            Value::Null => String::new(),
            Value::Str(s) => quote(s, WRITE_QUOTE),
            other => {
                return Err(CodecError::unsupported(
                    "DataFrame",
                    format!("cell of type {} is not a scalar", other.type_name()),
                ));
            }
        },
    };
    Ok(text)
}

/// Render a table as comma-separated text with a quoted header row
pub fn write_table(table: &Table) -> Result<String, CodecError> {
    let mut out = String::new();
    let header: Vec<String> = table
        .columns()
        .iter()
        .map(|c| quote(&c.name, WRITE_QUOTE))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for r in 0..table.num_rows() {
        let cells = table
            .columns()
            .iter()
            .map(|c| format_cell(&c.values[r]))
            .collect::<Result<Vec<_>, _>>()?;
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    Ok(out)
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Field {
    text: String,
    quoted: bool,
}

/// Split text into records of fields
fn split_records(text: &str, q: char) -> Result<Vec<Vec<Field>>, CodecError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = Field {
        text: String::new(),
        quoted: false,
    };
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == q {
                if chars.peek() == Some(&q) {
                    chars.next();
                    field.text.push(q);
                } else {
                    in_quotes = false;
                }
            } else {
                if c == '\n' {
                    line += 1;
                }
                field.text.push(c);
            }
            continue;
        }
        match c {
            c if c == q && field.text.is_empty() && !field.quoted => {
                in_quotes = true;
                field.quoted = true;
            }
            c if c == SEPARATOR => {
                record.push(std::mem::replace(
                    &mut field,
                    Field {
                        text: String::new(),
                        quoted: false,
                    },
                ));
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::replace(
                    &mut field,
                    Field {
                        text: String::new(),
                        quoted: false,
                    },
                ));
                records.push(std::mem::take(&mut record));
            }
            c => {
                if field.quoted {
                    return Err(CodecError::Delimited(format!(
                        "line {}: text after closing quote",
                        line
                    )));
                }
                field.text.push(c);
            }
        }
    }
    if in_quotes {
        return Err(CodecError::Delimited(format!(
            "line {}: unterminated quoted field",
            line
        )));
    }
    if !record.is_empty() || !field.text.is_empty() || field.quoted {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

fn parse_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" | "nan" | "NA" => Some(f64::NAN),
        "Inf" | "inf" | "+Inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        t => t.parse::<f64>().ok(),
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn is_missing(field: &Field) -> bool {
    !field.quoted && field.text.trim().is_empty()
}

fn infer_kind(cells: &[&Field]) -> ColumnKind {
    let present: Vec<&&Field> = cells.iter().filter(|f| !is_missing(f)).collect();
    if present.iter().any(|f| f.quoted) {
        return ColumnKind::Text;
    }
    if present.is_empty() {
        return ColumnKind::Float;
    }
    if present.iter().all(|f| f.text.trim().parse::<i64>().is_ok()) {
        ColumnKind::Int
    } else if present.iter().all(|f| parse_float(&f.text).is_some()) {
        ColumnKind::Float
    } else if present.iter().all(|f| parse_bool(&f.text).is_some()) {
        ColumnKind::Bool
    } else {
        ColumnKind::Text
    }
}

fn convert(field: &Field, kind: ColumnKind) -> Value {
    if is_missing(field) {
        return Value::Null;
    }
    let text = field.text.trim();
    match kind {
        ColumnKind::Int => text.parse().map(Value::Int).unwrap_or(Value::Null),
        ColumnKind::Float => parse_float(text).map(Value::Float).unwrap_or(Value::Null),
        ColumnKind::Bool => parse_bool(text).map(Value::Bool).unwrap_or(Value::Null),
        ColumnKind::Text => Value::Str(field.text.clone()),
    }
}

/// Parse comma-separated text with a header row into a table
pub fn read_table(text: &str, quote_char: char) -> Result<Table, CodecError> {
    let mut records = split_records(text, quote_char)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| CodecError::Delimited("missing header row".to_string()))?;
    let rows: Vec<Vec<Field>> = records
        .filter(|r| !(r.len() == 1 && is_missing(&r[0])))
        .collect();

    for (i, row) in rows.iter().enumerate() {
        if row.len() != header.len() {
            return Err(CodecError::Delimited(format!(
                "row {} has {} fields, header has {}",
                i + 1,
                row.len(),
                header.len()
            )));
        }
    }

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells: Vec<&Field> = rows.iter().map(|r| &r[i]).collect();
            let kind = infer_kind(&cells);
            let values = cells.iter().map(|f| convert(f, kind)).collect();
            Column::new(name.text.clone(), values)
        })
        .collect();
    Ok(Table::new(columns)?)
}
