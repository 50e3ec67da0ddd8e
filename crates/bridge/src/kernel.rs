//! The host kernel contract
//!
//! The bridge never talks to a target REPL directly: it submits code through
//! whatever kernel host is driving the notebook. [`HostKernel`] is that
//! seam. [`OctaveSession`](crate::OctaveSession) implements it over a
//! subprocess; tests implement it with a scripted fake.

use matbridge_core::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io;

/// A cell to run in the target kernel
#[derive(Debug, Clone, PartialEq)]
pub struct CellRequest {
    pub code: String,
    pub store_history: bool,
    pub silent: bool,
    /// Message the host reports if the cell fails
    pub on_error: Option<String>,
}

impl CellRequest {
    pub fn new(code: impl Into<String>) -> Self {
        CellRequest {
            code: code.into(),
            store_history: false,
            silent: false,
            on_error: None,
        }
    }

    pub fn with_store_history(mut self, store: bool) -> Self {
        self.store_history = store;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_on_error(mut self, message: impl Into<String>) -> Self {
        self.on_error = Some(message.into());
        self
    }
}

/// Outcome of a cell
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Ok,
    Error { name: String, message: String },
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        matches!(self, Completion::Ok)
    }
}

/// Kind of an output message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Stream,
    DisplayData,
    ExecuteResult,
    Error,
}

/// One output message emitted while code ran
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Stream name for `Stream` messages (`stdout`, `stderr`)
    pub name: String,
    pub text: String,
}

impl Message {
    pub fn stdout(text: impl Into<String>) -> Self {
        Message {
            kind: MessageKind::Stream,
            name: "stdout".to_string(),
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Message {
            kind: MessageKind::Stream,
            name: "stderr".to_string(),
            text: text.into(),
        }
    }
}

/// Communication with the target kernel failed
#[derive(Debug)]
pub enum KernelError {
    Spawn { command: String, source: io::Error },
    Io(io::Error),
    /// The kernel went away mid-request
    Disconnected,
    Protocol(String),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Spawn { command, source } => {
                write!(f, "Failed to start '{}': {}", command, source)
            }
            KernelError::Io(e) => write!(f, "Kernel I/O error: {}", e),
            KernelError::Disconnected => write!(f, "Kernel disconnected"),
            KernelError::Protocol(msg) => write!(f, "Kernel protocol error: {}", msg),
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KernelError::Spawn { source, .. } => Some(source),
            KernelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for KernelError {
    fn from(e: io::Error) -> Self {
        KernelError::Io(e)
    }
}

/// What the bridge needs from the kernel host
pub trait HostKernel {
    /// Run code in the target kernel, reporting failures with `on_error`
    fn run_cell(&mut self, request: &CellRequest) -> Result<Completion, KernelError>;

    /// Run code and collect its output messages of the given kinds, keeping
    /// only streams named `stream`
    fn get_response(
        &mut self,
        code: &str,
        kinds: &[MessageKind],
        stream: &str,
    ) -> Result<Vec<Message>, KernelError>;

    /// Show a warning to the user
    fn warn(&mut self, message: &str);
}

/// Host-side variables by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    vars: BTreeMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Move every variable of `other` in, replacing same-named ones
    pub fn extend(&mut self, other: VariableStore) {
        self.vars.extend(other.vars);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, Value)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        VariableStore {
            vars: iter.into_iter().collect(),
        }
    }
}
