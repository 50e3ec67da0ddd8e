//! Moving variables between the host and a MATLAB/Octave kernel
//!
//! `get_vars` renders host values as target assignments and runs them;
//! `put_vars` asks the target to print values in host-literal syntax and
//! parses the text back. Per-variable failures are warnings: the rest of
//! the batch still goes through. Only a broken kernel connection is an
//! error.

use crate::config::{BridgeConfig, ConfigError};
use crate::dialect::{self, LanguageSpec};
use crate::helpers;
use crate::kernel::{CellRequest, HostKernel, KernelError, MessageKind, VariableStore};
use matbridge_codec::matfile::is_valid_identifier;
use matbridge_codec::{CodecError, Dialect, FsLoader, Renderer, StagingDir, parse_with, quote_str};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Errors setting up a bridge or running its commands
#[derive(Debug)]
pub enum BridgeError {
    Config(ConfigError),
    Codec(CodecError),
    Io(io::Error),
    Kernel(KernelError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Config(e) => write!(f, "{}", e),
            BridgeError::Codec(e) => write!(f, "{}", e),
            BridgeError::Io(e) => write!(f, "I/O error: {}", e),
            BridgeError::Kernel(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Config(e) => Some(e),
            BridgeError::Codec(e) => Some(e),
            BridgeError::Io(e) => Some(e),
            BridgeError::Kernel(e) => Some(e),
        }
    }
}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        BridgeError::Config(e)
    }
}

impl From<CodecError> for BridgeError {
    fn from(e: CodecError) -> Self {
        BridgeError::Codec(e)
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::Io(e)
    }
}

impl From<KernelError> for BridgeError {
    fn from(e: KernelError) -> Self {
        BridgeError::Kernel(e)
    }
}

/// Exchanges variables with one MATLAB or Octave kernel
#[derive(Debug)]
pub struct MatlabBridge {
    kernel_name: String,
    language: &'static LanguageSpec,
    staging: StagingDir,
    helper_dir: PathBuf,
    rename_prefix: String,
    discovery_prefix: String,
}

impl MatlabBridge {
    /// Set up a bridge for the kernel named in `config`
    ///
    /// Creates the staging directory and, unless disabled, installs the
    /// companion scripts.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let language = dialect::lookup(&config.kernel)
            .ok_or_else(|| ConfigError::UnknownKernel(config.kernel.clone()))?;
        let staging = StagingDir::new(config.staging_root())?;
        let helper_dir = config.helper_root();
        if config.install_helpers {
            helpers::install(&helper_dir)?;
        }
        info!(
            "Bridge for kernel {} ({}) staging in {}",
            config.kernel,
            language.dialect,
            staging.path().display()
        );
        Ok(MatlabBridge {
            kernel_name: config.kernel.clone(),
            language,
            staging,
            helper_dir,
            rename_prefix: config.rename_prefix.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
        })
    }

    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    pub fn dialect(&self) -> Dialect {
        self.language.dialect
    }

    pub fn background_color(&self) -> &'static str {
        self.language.background_color
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Statements to run once when the target kernel starts
    pub fn init_statements(&self) -> String {
        let mut stmts = format!(
            "path(path, {})\n",
            quote_str(&self.helper_dir.to_string_lossy())
        );
        if self.language.dialect == Dialect::Octave {
            stmts.push_str("pkg load dataframe\n");
        }
        stmts
    }

    /// Change the target's working directory
    pub fn cd_command(&self, dir: &Path) -> String {
        format!("cd {}", quote_str(&dir.to_string_lossy()))
    }

    // ========================================================================
    // host -> target
    // ========================================================================

    /// Copy host variables `names` into the target
    ///
    /// `as_var` names the target variable; it only makes sense with a single
    /// name. Host names starting with `_` are not valid target identifiers
    /// and get the rename prefix.
    pub fn get_vars(
        &self,
        kernel: &mut dyn HostKernel,
        store: &VariableStore,
        names: &[&str],
        as_var: Option<&str>,
    ) -> Result<(), KernelError> {
        let renderer = Renderer::new(&self.staging, self.language.dialect);
        for &name in names {
            let target = match as_var {
                Some(target) => target.to_string(),
                None if name.starts_with('_') => {
                    let renamed = format!("{}{}", self.rename_prefix, name);
                    self.warn(
                        kernel,
                        &format!(
                            "Variable {} is passed from the host to kernel {} as {}",
                            name, self.kernel_name, renamed
                        ),
                    );
                    renamed
                }
                None => name.to_string(),
            };
            if !is_valid_identifier(&target) {
                self.warn(
                    kernel,
                    &format!("Cannot get variable {}: {} is not a valid name", name, target),
                );
                continue;
            }

            let Some(value) = store.get(name) else {
                self.warn(kernel, &format!("Variable {} does not exist", name));
                continue;
            };
            let on_error = format!(
                "Failed to get variable {} of type {} to {}",
                name,
                value.type_name(),
                self.language.dialect
            );
            let expr = match renderer.render(value) {
                Ok(expr) => expr,
                Err(e) => {
                    self.warn(kernel, &format!("{}: {}", on_error, e));
                    continue;
                }
            };

            let code = format!("{} = {}", target, expr);
            debug!("Executing\n{}", code);
            let request = CellRequest::new(code)
                .with_store_history(true)
                .with_on_error(on_error.clone());
            if !kernel.run_cell(&request)?.is_ok() {
                warn!("{}", on_error);
            }
        }
        Ok(())
    }

    // ========================================================================
    // target -> host
    // ========================================================================

    /// Read target variables `names` back as host values
    ///
    /// With no names, every target variable starting with the discovery
    /// prefix is read. Variables that fail to print or parse are left out
    /// of the result with a warning.
    pub fn put_vars(
        &self,
        kernel: &mut dyn HostKernel,
        names: &[&str],
        as_var: Option<&str>,
    ) -> Result<VariableStore, KernelError> {
        let names: Vec<String> = if names.is_empty() {
            self.discover(kernel)?
        } else {
            names.iter().map(|n| n.to_string()).collect()
        };

        let mut result = VariableStore::new();
        for name in &names {
            if !is_valid_identifier(name) {
                self.warn(kernel, &format!("{} is not a valid variable name", name));
                continue;
            }
            let code = format!("disp(matbridge_py_repr({}))", name);
            let text = self.stdout_of(kernel, &code)?;
            let text = text.trim_end();
            debug!("{} printed as {}", name, text);
            match parse_with(text, &FsLoader) {
                Ok(value) => {
                    result.insert(as_var.unwrap_or(name.as_str()), value);
                }
                Err(e) => {
                    self.warn(kernel, &format!("Failed to evaluate {:?}: {}", text, e));
                }
            }
        }
        Ok(result)
    }

    /// Target variables whose names start with the discovery prefix
    fn discover(&self, kernel: &mut dyn HostKernel) -> Result<Vec<String>, KernelError> {
        let prefix = &self.discovery_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.warn(
                kernel,
                &format!("Discovery prefix {:?} is not an identifier prefix", prefix),
            );
            return Ok(Vec::new());
        }
        let code = format!("disp(strjoin(who('{}*')', ' '))", prefix);
        let listing = self.stdout_of(kernel, &code)?;
        let names: Vec<String> = listing
            .split_whitespace()
            .filter(|n| n.starts_with(prefix.as_str()) && is_valid_identifier(n))
            .map(str::to_string)
            .collect();
        debug!("Discovered {:?}", names);
        Ok(names)
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Version banner of the target (`ver`)
    pub fn sessioninfo(&self, kernel: &mut dyn HostKernel) -> Result<String, KernelError> {
        self.stdout_of(kernel, "ver")
    }

    /// Run `code` and concatenate every stdout chunk in emission order
    fn stdout_of(&self, kernel: &mut dyn HostKernel, code: &str) -> Result<String, KernelError> {
        let messages = kernel.get_response(code, &[MessageKind::Stream], "stdout")?;
        Ok(messages.into_iter().map(|m| m.text).collect())
    }

    fn warn(&self, kernel: &mut dyn HostKernel, message: &str) {
        warn!("{}", message);
        kernel.warn(message);
    }
}
