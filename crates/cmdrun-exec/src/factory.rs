//! OS-backed command factory and runnable

use async_trait::async_trait;
use cmdrun_api::{CommandFactory, CommandRequest, OutputSink, Runnable};
use cmdrun_util::{CommandError, CommandResult, ExitStatus};
use std::process::Stdio;

use crate::process::{forward, read_all, ManagedProcess};

/// The standard factory. Holds no state; runnables it builds launch real
/// OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecCommandFactory;

impl ExecCommandFactory {
    pub fn new() -> Self {
        Self
    }
}

impl CommandFactory for ExecCommandFactory {
    fn prepare(&self, request: CommandRequest) -> Box<dyn Runnable> {
        Box::new(ExecCommand::new(request))
    }
}

/// Runnable that launches a fresh OS process for every run call
#[derive(Debug, Clone)]
pub struct ExecCommand {
    request: CommandRequest,
}

impl ExecCommand {
    pub fn new(request: CommandRequest) -> Self {
        Self { request }
    }

    fn program(&self) -> &str {
        self.request.program()
    }

    /// Nothing is launched once the context is already done
    fn check_context(&self) -> CommandResult<()> {
        match self.request.context().err() {
            Some(err) => Err(CommandError::from_context(self.program(), err)),
            None => Ok(()),
        }
    }

    fn spawn(&self, stdout: Stdio, stderr: Stdio) -> CommandResult<ManagedProcess> {
        self.check_context()?;
        ManagedProcess::spawn(&self.request, stdout, stderr)
    }

    fn ensure_success(&self, status: ExitStatus, stderr: &[u8]) -> CommandResult<()> {
        if status.is_success() {
            return Ok(());
        }

        Err(CommandError::NonZeroExit {
            program: self.program().to_string(),
            status,
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Runnable for ExecCommand {
    fn request(&self) -> &CommandRequest {
        &self.request
    }

    async fn run(&self) -> CommandResult<()> {
        let mut proc = self.spawn(Stdio::null(), Stdio::null())?;
        let (status, ()) = proc
            .wait_with(self.request.context(), async { Ok(()) })
            .await?;
        self.ensure_success(status, &[])
    }

    async fn run_stdout(&self) -> CommandResult<Vec<u8>> {
        let mut proc = self.spawn(Stdio::piped(), Stdio::piped())?;
        let stdout = proc.take_stdout();
        let stderr = proc.take_stderr();

        let (status, (out, err)) = proc
            .wait_with(self.request.context(), async {
                tokio::try_join!(read_all(stdout), read_all(stderr))
            })
            .await?;

        self.ensure_success(status, &err)?;
        Ok(out)
    }

    #[cfg(unix)]
    async fn run_combined(&self) -> CommandResult<Vec<u8>> {
        let (reader, stdout, stderr) =
            crate::process::combined_pipe().map_err(|e| CommandError::launch(self.program(), e))?;

        let mut proc = self.spawn(stdout, stderr)?;
        let (status, out) = proc
            .wait_with(self.request.context(), read_all(Some(reader)))
            .await?;

        self.ensure_success(status, &[])?;
        Ok(out)
    }

    #[cfg(not(unix))]
    async fn run_combined(&self) -> CommandResult<Vec<u8>> {
        let mut proc = self.spawn(Stdio::piped(), Stdio::piped())?;
        let stdout = proc.take_stdout();
        let stderr = proc.take_stderr();

        let (status, (mut out, err)) = proc
            .wait_with(self.request.context(), async {
                tokio::try_join!(read_all(stdout), read_all(stderr))
            })
            .await?;

        self.ensure_success(status, &[])?;
        out.extend_from_slice(&err);
        Ok(out)
    }

    async fn run_to_writer(
        &self,
        stdout: Option<&mut OutputSink>,
        stderr: Option<&mut OutputSink>,
    ) -> CommandResult<()> {
        let wiring = |present: bool| if present { Stdio::piped() } else { Stdio::null() };

        let mut proc = self.spawn(wiring(stdout.is_some()), wiring(stderr.is_some()))?;
        let out_pipe = proc.take_stdout();
        let err_pipe = proc.take_stderr();

        let (status, _) = proc
            .wait_with(self.request.context(), async {
                tokio::try_join!(forward(out_pipe, stdout), forward(err_pipe, stderr))
            })
            .await?;

        self.ensure_success(status, &[])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use cmdrun_api::{RunContext, TrimPostModifier};

    #[tokio::test]
    async fn factory_builds_without_launching() {
        let factory = ExecCommandFactory::new();
        let cmd = factory.command(
            RunContext::background(),
            "/nonexistent/cmdrun-test-binary",
            &["a", "b"],
        );

        assert_eq!(cmd.request().program(), "/nonexistent/cmdrun-test-binary");
        assert_eq!(cmd.request().args(), ["a", "b"]);

        let err = cmd.run().await.unwrap_err();
        assert!(matches!(err, CommandError::Launch { .. }));
    }

    #[tokio::test]
    async fn stdout_str_with_trim_chain() {
        let factory = ExecCommandFactory::new();
        let cmd = factory.command(RunContext::background(), "printf", &["\\tvalue  "]);

        let right = TrimPostModifier::right(" ");
        let left = TrimPostModifier::left("\t");

        assert_eq!(cmd.run_stdout_str(&[&right]).await.unwrap(), "\tvalue");
        assert_eq!(cmd.run_stdout_str(&[&right, &left]).await.unwrap(), "value");
    }

    #[tokio::test]
    async fn run_stdout_attaches_stderr_on_failure() {
        let factory = ExecCommandFactory::new();
        let cmd = factory.command(
            RunContext::background(),
            "sh",
            &["-c", "echo partial; echo broken >&2; exit 3"],
        );

        match cmd.run_stdout().await.unwrap_err() {
            CommandError::NonZeroExit { status, stderr, .. } => {
                assert_eq!(status, ExitStatus::with_code(3));
                assert_eq!(stderr, "broken\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_context_launches_nothing() {
        let ctx = RunContext::background();
        ctx.cancel();

        let cmd = ExecCommandFactory::new().command(ctx, "/nonexistent/cmdrun-test-binary", &[]);

        // A launch failure would surface if a spawn had been attempted.
        let err = cmd.run_combined().await.unwrap_err();
        assert!(matches!(err, CommandError::Cancelled { .. }));
    }
}
