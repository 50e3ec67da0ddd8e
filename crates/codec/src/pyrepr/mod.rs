//! Restricted host-literal parser
//!
//! The target prints variables in host-literal syntax (see the companion
//! `matbridge_py_repr.m`). This module reads that text back into a
//! [`Value`] without evaluating anything: the grammar is a fixed set of
//! literals plus a whitelist of constructor calls.
//!
//! # Grammar
//!
//! ```text
//! expr     := unary (('+' | '-') unary)?         real +/- imaginary only
//! unary    := ('+' | '-') unary | atom
//! atom     := number | string+ | '(' tuple ')' | '[' list ']'
//!           | '{' dict-or-set '}' | name ('.' name)* call?
//! call     := '(' args ')' ('[' string ']')?     subscript only after loadmat
//! ```
//!
//! Names: `None`, `True`, `False`, `nan`, `inf`, `nanj`, `infj`, `np.nan`,
//! `np.inf`. Calls: `complex`, `float`, `set`, `tuple`, `list`, `dict`,
//! `np.array`, `np.asarray`, `np.matrix`, `np.<dtype>`,
//! `sio.loadmat(path)[name]`, `pd.read_csv(path)` and `unsupported(class)`.
//!
//! Staged reads (`loadmat`, `read_csv`) go through a [`StagedLoader`], so
//! callers decide whether the filesystem may be touched at all.

mod lexer;
mod parser;

use crate::delimited;
use crate::error::CodecError;
use crate::matfile;
use matbridge_core::{Table, Value};
use std::fmt;
use std::fs;
use std::path::Path;

/// A literal that could not be parsed, with the byte offset of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralError {
    pub message: String,
    pub offset: usize,
}

impl LiteralError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        LiteralError {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

impl std::error::Error for LiteralError {}

/// Source of staged files referenced by `loadmat` and `read_csv` calls
pub trait StagedLoader {
    /// Variable `name` of the MAT file at `path`
    fn load_mat(&self, path: &str, name: &str) -> Result<Value, CodecError>;

    /// Table in the comma-separated file at `path`
    fn read_csv(&self, path: &str) -> Result<Table, CodecError>;
}

/// Reads staged files from the local filesystem
///
/// Tables are expected in the target's `writetable` format (`"` quoting).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl StagedLoader for FsLoader {
    fn load_mat(&self, path: &str, name: &str) -> Result<Value, CodecError> {
        matfile::load_variable(Path::new(path), name)
    }

    fn read_csv(&self, path: &str) -> Result<Table, CodecError> {
        let text = fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        delimited::read_table(&text, '"')
    }
}

/// Refuses every staged read
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStagedFiles;

impl StagedLoader for NoStagedFiles {
    fn load_mat(&self, path: &str, _name: &str) -> Result<Value, CodecError> {
        Err(CodecError::unsupported(
            "loadmat",
            format!("staged file {} is not readable here", path),
        ))
    }

    fn read_csv(&self, path: &str) -> Result<Table, CodecError> {
        Err(CodecError::unsupported(
            "read_csv",
            format!("staged file {} is not readable here", path),
        ))
    }
}

/// Parse a literal that must not reference staged files
pub fn parse(text: &str) -> Result<Value, LiteralError> {
    parse_with(text, &NoStagedFiles)
}

/// Parse a literal, resolving staged-file calls through `loader`
pub fn parse_with(text: &str, loader: &dyn StagedLoader) -> Result<Value, LiteralError> {
    let tokens = lexer::tokenize(text)?;
    parser::Parser::new(tokens, text.len(), loader).parse()
}
