//! matbridge: variable exchange between a notebook host and MATLAB/Octave
//!
//! A [`MatlabBridge`] copies host variables into a MATLAB or Octave kernel
//! (`get_vars`) and reads target variables back (`put_vars`), talking to the
//! kernel only through the [`HostKernel`] trait.
//!
//! ```rust,ignore
//! use matbridge::{BridgeConfig, MatlabBridge, OctaveSession, VariableStore};
//! use matbridge_core::Value;
//!
//! let config = BridgeConfig::new().with_kernel("octave");
//! let bridge = MatlabBridge::new(&config)?;
//! let mut octave = OctaveSession::spawn(&config.octave_command)?;
//!
//! let mut store = VariableStore::new();
//! store.insert("x", Value::Int(42));
//! bridge.get_vars(&mut octave, &store, &["x"], None)?;
//! let back = bridge.put_vars(&mut octave, &["x"], None)?;
//! ```

pub mod bridge;
pub mod config;
pub mod dialect;
pub mod helpers;
pub mod kernel;
pub mod process;

pub use bridge::{BridgeError, MatlabBridge};
pub use config::{BridgeConfig, ConfigError};
pub use dialect::{LanguageSpec, SUPPORTED_LANGUAGES};
pub use kernel::{
    CellRequest, Completion, HostKernel, KernelError, Message, MessageKind, VariableStore,
};
pub use process::OctaveSession;
