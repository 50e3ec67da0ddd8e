//! Companion target scripts
//!
//! Two `.m` files ship inside the binary and are written to the helper
//! directory, which the bridge's init statements put on the target path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads a staged N-D array
pub const LOAD_ARRAY_SCRIPT: &str = include_str!("../assets/matbridge_load_array.m");

/// Prints a target value in host-literal syntax
pub const PY_REPR_SCRIPT: &str = include_str!("../assets/matbridge_py_repr.m");

/// File name and contents of every companion script
pub const SCRIPTS: &[(&str, &str)] = &[
    ("matbridge_load_array.m", LOAD_ARRAY_SCRIPT),
    ("matbridge_py_repr.m", PY_REPR_SCRIPT),
];

/// Write the companion scripts into `dir`, creating it if needed
///
/// Files already holding the right contents are left alone. Returns the
/// paths of every script.
pub fn install(dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(SCRIPTS.len());
    for (name, contents) in SCRIPTS {
        let path = dir.join(name);
        let current = fs::read_to_string(&path).ok();
        if current.as_deref() != Some(*contents) {
            debug!("Installing {}", path.display());
            fs::write(&path, contents)?;
        }
        paths.push(path);
    }
    Ok(paths)
}
