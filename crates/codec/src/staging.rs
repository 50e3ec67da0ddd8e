//! Staging directory for values too large or structured to inline
//!
//! The target REPL's text input is not a reliable channel for big or binary
//! payloads, so mappings, matrices, arrays and tables are written to a file
//! and the target expression loads that file.
//!
//! Each staged file gets a random suffix. Two exchanges staging the same
//! kind of value never share a path, so no locking is needed. A file is only
//! kept once its contents are fully written; a failed write removes it.
//! Kept files are left for the REPL to read and are not cleaned up here.

use crate::error::CodecError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directory that receives staged files
#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
}

impl StagingDir {
    /// Use `root` as the staging directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CodecError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CodecError::io(&root, e))?;
        Ok(StagingDir { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to a new uniquely named file and keep it on disk
    ///
    /// The file name is `<prefix><random><suffix>`.
    pub fn stage(
        &self,
        prefix: &str,
        suffix: &str,
        contents: &[u8],
    ) -> Result<StagedFile, CodecError> {
        let mut temp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.root)
            .map_err(|e| CodecError::io(&self.root, e))?;

        temp.write_all(contents)
            .and_then(|_| temp.flush())
            .map_err(|e| CodecError::io(temp.path(), e))?;

        let (_file, path) = temp
            .keep()
            .map_err(|e| CodecError::io(&self.root, io::Error::from(e)))?;
        debug!("Staged {} ({} bytes)", path.display(), contents.len());
        Ok(StagedFile { path })
    }
}

/// A file written into the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory part, as text for embedding in a target expression
    pub fn dir(&self) -> String {
        self.path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name part, as text for embedding in a target expression
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
