//! Bridge configuration
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and environment overrides.
//!
//! # Example
//!
//! ```toml
//! kernel = "octave"
//! staging_dir = "/tmp/matbridge"
//! rename_prefix = "m"
//! discovery_prefix = "sos"
//! octave_command = "octave-cli"
//! ```
//!
//! ```rust,ignore
//! use matbridge::BridgeConfig;
//!
//! let config = BridgeConfig::new()
//!     .with_kernel("matlab")
//!     .with_staging_dir("/scratch/exchange");
//! ```

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Overrides `staging_dir`
pub const ENV_STAGING_DIR: &str = "MATBRIDGE_STAGING_DIR";

/// Overrides `octave_command`
pub const ENV_OCTAVE: &str = "MATBRIDGE_OCTAVE";

/// Errors loading configuration
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse(String),
    /// Kernel name that maps to no known target language
    UnknownKernel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::UnknownKernel(name) => {
                write!(f, "Kernel '{}' is not a MATLAB or Octave kernel", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Configuration for a [`MatlabBridge`](crate::MatlabBridge)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Name of the target kernel (`matlab`, `imatlab` or `octave`)
    pub kernel: String,

    /// Where staged exchange files are written (system temp dir if unset)
    pub staging_dir: Option<PathBuf>,

    /// Where the companion target scripts are installed
    /// (`<staging dir>/matbridge-helpers` if unset)
    pub helper_dir: Option<PathBuf>,

    /// Write the companion scripts when the bridge is created
    pub install_helpers: bool,

    /// Prefix for host names that are not valid target identifiers
    pub rename_prefix: String,

    /// Target variables starting with this are sent when no names are given
    pub discovery_prefix: String,

    /// Command used to start an Octave session
    pub octave_command: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            kernel: "octave".to_string(),
            staging_dir: None,
            helper_dir: None,
            install_helpers: true,
            rename_prefix: "m".to_string(),
            discovery_prefix: "sos".to_string(),
            octave_command: "octave-cli".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `MATBRIDGE_STAGING_DIR` and `MATBRIDGE_OCTAVE` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = env::var_os(ENV_STAGING_DIR).filter(|v| !v.is_empty()) {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        if let Some(command) = env::var(ENV_OCTAVE).ok().filter(|v| !v.is_empty()) {
            self.octave_command = command;
        }
        self
    }

    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_helper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.helper_dir = Some(dir.into());
        self
    }

    pub fn with_install_helpers(mut self, install: bool) -> Self {
        self.install_helpers = install;
        self
    }

    pub fn with_rename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rename_prefix = prefix.into();
        self
    }

    pub fn with_discovery_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.discovery_prefix = prefix.into();
        self
    }

    pub fn with_octave_command(mut self, command: impl Into<String>) -> Self {
        self.octave_command = command.into();
        self
    }

    /// Directory staged files go to
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// Directory the companion scripts go to
    pub fn helper_root(&self) -> PathBuf {
        self.helper_dir
            .clone()
            .unwrap_or_else(|| self.staging_root().join("matbridge-helpers"))
    }
}
