//! Command abstraction interfaces for cmdrun
//!
//! This crate defines the contract between callers and whatever actually
//! launches processes. It contains no process code itself; the OS-backed
//! implementation lives in `cmdrun-exec` and a scripted double lives in
//! [`MockCommandFactory`].

mod mock;
mod modifier;
mod traits;

pub use cmdrun_util::{CommandError, CommandResult, ContextError, ExitStatus, RunContext};
pub use mock::*;
pub use modifier::*;
pub use traits::*;
