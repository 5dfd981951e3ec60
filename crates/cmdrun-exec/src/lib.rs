//! OS-backed command execution for cmdrun
//!
//! Provides:
//! - `ExecCommandFactory`, the standard stateless factory
//! - Process spawning with process group isolation (Unix)
//! - stdout, combined, and streamed capture modes
//! - Process group termination when the bound context is done

mod factory;
mod process;

pub use factory::*;
pub use process::*;
