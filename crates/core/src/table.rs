//! Tabular data: rows by named columns
//!
//! Cells are restricted to single-cell values (null, bool, numbers,
//! strings); the check happens once at construction so every `Table` in
//! circulation can be written to a delimited file.

use crate::value::Value;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    /// Column length differs from the first column
    Ragged {
        column: String,
        expected: usize,
        actual: usize,
    },
    DuplicateColumn(String),
    /// A cell holds a container or array
    NonScalarCell { column: String, row: usize },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Ragged {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column '{}' has {} rows, expected {}",
                column, actual, expected
            ),
            TableError::DuplicateColumn(name) => write!(f, "duplicate column '{}'", name),
            TableError::NonScalarCell { column, row } => write!(
                f,
                "cell in column '{}' row {} is not a scalar",
                column, row
            ),
        }
    }
}

impl std::error::Error for TableError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for (i, column) in columns.iter().enumerate() {
            if column.values.len() != rows {
                return Err(TableError::Ragged {
                    column: column.name.clone(),
                    expected: rows,
                    actual: column.values.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if let Some(row) = column.values.iter().position(|v| !v.is_scalar()) {
                return Err(TableError::NonScalarCell {
                    column: column.name.clone(),
                    row,
                });
            }
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Cells of one row, in column order
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.rows {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }
}
