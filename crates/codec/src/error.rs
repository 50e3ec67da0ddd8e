//! Codec errors
//!
//! One enum for everything that can go wrong while turning a value into a
//! target expression or reading a staged file back.

use matbridge_core::{ArrayError, TableError};
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CodecError {
    /// No rendering rule accepts this value
    Unsupported {
        type_name: &'static str,
        reason: String,
    },
    /// Filesystem failure while staging or loading
    Io { path: PathBuf, source: io::Error },
    /// Malformed or unsupported MAT container content
    MatFile(String),
    /// Malformed delimited table
    Delimited(String),
    Table(TableError),
    Array(ArrayError),
}

impl CodecError {
    pub fn unsupported(type_name: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Unsupported {
            type_name,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CodecError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, CodecError::Unsupported { .. })
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Unsupported { type_name, reason } => {
                write!(f, "unsupported value of type {}: {}", type_name, reason)
            }
            CodecError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CodecError::MatFile(msg) => write!(f, "MAT file: {}", msg),
            CodecError::Delimited(msg) => write!(f, "delimited table: {}", msg),
            CodecError::Table(e) => write!(f, "table: {}", e),
            CodecError::Array(e) => write!(f, "array: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io { source, .. } => Some(source),
            CodecError::Table(e) => Some(e),
            CodecError::Array(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TableError> for CodecError {
    fn from(e: TableError) -> Self {
        CodecError::Table(e)
    }
}

impl From<ArrayError> for CodecError {
    fn from(e: ArrayError) -> Self {
        CodecError::Array(e)
    }
}
