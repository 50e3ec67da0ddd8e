//! matbridge codec: moving values between host and target text
//!
//! Two directions, two very different problems:
//!
//! - **host -> target** ([`render`]): build an Octave/MATLAB expression for a
//!   [`Value`](matbridge_core::Value). Scalars and small containers become
//!   literals; anything structured is staged to a file ([`staging`]) in MAT
//!   v5 ([`matfile`]) or comma-separated ([`delimited`]) form and loaded by
//!   the expression.
//! - **target -> host** ([`pyrepr`]): the target prints values in
//!   host-literal syntax, which is parsed back by a restricted parser that
//!   never evaluates anything.

pub mod delimited;
pub mod error;
pub mod matfile;
pub mod pyrepr;
pub mod render;
pub mod staging;

pub use error::CodecError;
pub use pyrepr::{FsLoader, LiteralError, NoStagedFiles, StagedLoader, parse, parse_with};
pub use render::{Dialect, Renderer, is_homogeneous, quote_str};
pub use staging::{StagedFile, StagingDir};
