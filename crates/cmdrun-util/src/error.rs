//! Error types for cmdrun

use std::io;
use thiserror::Error;

use crate::{ContextError, ExitStatus};

/// Every failure a run mode or post-modifier can report
#[derive(Debug, Error)]
pub enum CommandError {
    /// Program not found, not executable, or the OS refused to spawn it
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program}: {status}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        /// Captured standard error, only populated by stdout-capturing runs
        stderr: String,
    },

    #[error("{program}: context canceled")]
    Cancelled { program: String },

    #[error("{program}: context deadline exceeded")]
    DeadlineExceeded { program: String },

    /// Reading a pipe or writing to a caller sink failed
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("unknown trim option: {0}")]
    UnknownTrimOption(u8),

    /// A post-modifier failed; `output` holds the value produced before it ran
    #[error("post-modifier {stage} failed: {source}")]
    ModifierChain {
        output: String,
        stage: usize,
        #[source]
        source: Box<CommandError>,
    },
}

impl CommandError {
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    pub fn io(program: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            program: program.into(),
            source,
        }
    }

    pub fn from_context(program: impl Into<String>, err: ContextError) -> Self {
        let program = program.into();
        match err {
            ContextError::Cancelled => Self::Cancelled { program },
            ContextError::DeadlineExceeded => Self::DeadlineExceeded { program },
        }
    }

    /// True when the bound context ended the call
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled { .. } | Self::DeadlineExceeded { .. } => true,
            Self::ModifierChain { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Exit status of a process that ran but failed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::NonZeroExit { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Output salvaged alongside the error. Only a failing post-modifier
    /// chain keeps partial progress; every other error yields `""`.
    pub fn partial_output(&self) -> &str {
        match self {
            Self::ModifierChain { output, .. } => output,
            _ => "",
        }
    }
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
