//! Shared types for cmdrun
//!
//! This crate provides:
//! - The cancellation context bound to every command (`RunContext`)
//! - Exit status reporting
//! - The error taxonomy returned by every run mode

mod context;
mod error;
mod status;

pub use context::*;
pub use error::*;
pub use status::*;
