//! Runnable command and command factory traits

use async_trait::async_trait;
use cmdrun_util::{CommandResult, RunContext};
use tokio::io::AsyncWrite;

use crate::{apply_modifiers, PostModifier};

/// Caller-supplied destination for a streamed output channel
pub type OutputSink = dyn AsyncWrite + Unpin + Send;

/// One prepared, not-yet-executed command.
///
/// Immutable once built: the program and arguments are passed to the OS as
/// a discrete list, never joined into a shell string.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    ctx: RunContext,
    program: String,
    args: Vec<String>,
}

impl CommandRequest {
    pub fn new<I, S>(ctx: RunContext, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ctx,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Lossy UTF-8 decoding of captured output
pub fn decode_output(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// A launchable command offering several capture modes.
///
/// Every `run*` call launches a fresh process from the same request; nothing
/// is cached between calls, so a single `Runnable` may be run repeatedly and
/// concurrently.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// The request this runnable was built from
    fn request(&self) -> &CommandRequest;

    /// Run to completion, discarding all output
    async fn run(&self) -> CommandResult<()>;

    /// Run and capture standard output
    async fn run_stdout(&self) -> CommandResult<Vec<u8>>;

    /// Run, decode standard output as text and pass it through `modifiers`
    /// in order.
    ///
    /// If the process fails no modifier runs. If a modifier fails, the
    /// returned [`ModifierChain`](cmdrun_util::CommandError::ModifierChain)
    /// error carries the last successfully produced value.
    async fn run_stdout_str(&self, modifiers: &[&dyn PostModifier]) -> CommandResult<String> {
        let bytes = self.run_stdout().await?;
        apply_modifiers(decode_output(bytes), modifiers)
    }

    /// Run and capture standard output and standard error on one channel
    async fn run_combined(&self) -> CommandResult<Vec<u8>>;

    async fn run_combined_str(&self) -> CommandResult<String> {
        let bytes = self.run_combined().await?;
        Ok(decode_output(bytes))
    }

    /// Run with output streamed into the given sinks as it is produced.
    /// A `None` sink leaves that stream unredirected (null device).
    async fn run_to_writer(
        &self,
        stdout: Option<&mut OutputSink>,
        stderr: Option<&mut OutputSink>,
    ) -> CommandResult<()>;
}

/// Builds runnables. No process is launched at construction time.
pub trait CommandFactory: Send + Sync {
    fn prepare(&self, request: CommandRequest) -> Box<dyn Runnable>;

    fn command(&self, ctx: RunContext, program: &str, args: &[&str]) -> Box<dyn Runnable> {
        self.prepare(CommandRequest::new(ctx, program, args.iter().copied()))
    }
}
