//! Process management utilities

use cmdrun_api::CommandRequest;
use cmdrun_util::{CommandError, CommandResult, ExitStatus, RunContext};
use std::future::Future;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Child process launched from a [`CommandRequest`]
///
/// On Unix the child leads its own process group so that the whole tree can
/// be killed when the context is done, or when the handle is dropped before
/// the child was reaped.
pub struct ManagedProcess {
    child: Child,
    program: String,
    pid: Option<u32>,
    reaped: bool,
}

impl ManagedProcess {
    /// Spawn `request` with the given stdout/stderr wiring; stdin is always
    /// the null device.
    pub fn spawn(request: &CommandRequest, stdout: Stdio, stderr: Stdio) -> CommandResult<Self> {
        let program = request.program();

        let mut cmd = Command::new(program);
        cmd.args(request.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| CommandError::launch(program, e))?;

        // The command still owns the parent's copies of any pipe write ends.
        drop(cmd);

        let pid = child.id();
        debug!(pid = ?pid, program = %program, "Process spawned");

        Ok(Self {
            child,
            program: program.to_string(),
            pid,
            reaped: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit while driving `pipes` to completion.
    ///
    /// If `ctx` finishes first, or `pipes` fails, the process group is killed
    /// and reaped before returning.
    pub async fn wait_with<F, T>(
        &mut self,
        ctx: &RunContext,
        pipes: F,
    ) -> CommandResult<(ExitStatus, T)>
    where
        F: Future<Output = io::Result<T>>,
    {
        let outcome = {
            let drive = async { tokio::try_join!(self.child.wait(), pipes) };
            tokio::select! {
                res = drive => Ok(res),
                err = ctx.done() => Err(err),
            }
        };

        match outcome {
            Ok(Ok((status, value))) => {
                self.reaped = true;
                let status = ExitStatus::from(status);
                debug!(
                    pid = ?self.pid,
                    program = %self.program,
                    status = %status,
                    "Process exited"
                );
                Ok((status, value))
            }
            Ok(Err(e)) => {
                self.terminate().await;
                Err(CommandError::io(&self.program, e))
            }
            Err(err) => {
                debug!(
                    pid = ?self.pid,
                    program = %self.program,
                    reason = %err,
                    "Context done, terminating process"
                );
                self.terminate().await;
                Err(CommandError::from_context(&self.program, err))
            }
        }
    }

    /// Kill the process (group) and reap it
    async fn terminate(&mut self) {
        #[cfg(unix)]
        self.kill_group();

        if let Err(e) = self.child.start_kill() {
            debug!(
                pid = ?self.pid,
                error = %e,
                "Direct kill failed, process likely already exited"
            );
        }

        match self.child.wait().await {
            Ok(_) => self.reaped = true,
            Err(e) => warn!(pid = ?self.pid, error = %e, "Failed to reap terminated process"),
        }
    }

    /// Send SIGKILL to the process group
    #[cfg(unix)]
    fn kill_group(&self) {
        let Some(pgid) = self
            .pid
            .and_then(|pid| i32::try_from(pid).ok())
            .filter(|p| *p > 0)
        else {
            return;
        };

        match signal::kill(Pid::from_raw(-pgid), Signal::SIGKILL) {
            Ok(()) => debug!(pgid = pgid, "Sent SIGKILL to process group"),
            Err(nix::errno::Errno::ESRCH) => {
                // Process group already gone
            }
            Err(e) => warn!(pgid = pgid, error = %e, "Failed to send SIGKILL to process group"),
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // kill_on_drop only reaches the direct child; the rest of the group
        // would otherwise outlive a dropped run.
        if self.reaped {
            return;
        }

        debug!(pid = ?self.pid, program = %self.program, "Dropped before exit, killing process");
        #[cfg(unix)]
        self.kill_group();
    }
}

/// Read a pipe to EOF; an absent pipe reads as empty
pub async fn read_all<R>(pipe: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Copy a pipe into a sink as data arrives, then flush the sink
pub async fn forward<R, W>(pipe: Option<R>, sink: Option<&mut W>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    if let (Some(mut pipe), Some(sink)) = (pipe, sink) {
        tokio::io::copy(&mut pipe, &mut *sink).await?;
        sink.flush().await?;
    }
    Ok(())
}

/// One pipe whose write end is handed to both stdout and stderr, so the
/// reader sees output in the order the kernel delivered it.
#[cfg(unix)]
pub fn combined_pipe() -> io::Result<(tokio::net::unix::pipe::Receiver, Stdio, Stdio)> {
    use std::os::fd::OwnedFd;

    let (reader, writer) = std::io::pipe()?;
    let stderr_writer = writer.try_clone()?;
    let receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;

    Ok((receiver, Stdio::from(writer), Stdio::from(stderr_writer)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(ctx: &RunContext, argv: &[&str]) -> CommandRequest {
        CommandRequest::new(ctx.clone(), argv[0], argv[1..].iter().copied())
    }

    #[tokio::test]
    async fn spawn_simple_process() {
        let ctx = RunContext::background();
        let mut proc =
            ManagedProcess::spawn(&request(&ctx, &["true"]), Stdio::null(), Stdio::null()).unwrap();

        assert!(proc.pid().is_some());
        let (status, ()) = proc.wait_with(&ctx, async { Ok(()) }).await.unwrap();
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn spawn_missing_program() {
        let ctx = RunContext::background();
        let result = ManagedProcess::spawn(
            &request(&ctx, &["/nonexistent/cmdrun-test-binary"]),
            Stdio::null(),
            Stdio::null(),
        );

        assert!(matches!(result, Err(CommandError::Launch { .. })));
    }

    #[tokio::test]
    async fn read_stdout_while_waiting() {
        let ctx = RunContext::background();
        let mut proc = ManagedProcess::spawn(
            &request(&ctx, &["echo", "hello"]),
            Stdio::piped(),
            Stdio::null(),
        )
        .unwrap();

        let stdout = proc.take_stdout();
        let (status, out) = proc.wait_with(&ctx, read_all(stdout)).await.unwrap();

        assert!(status.is_success());
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn combined_pipe_sees_both_streams() {
        let ctx = RunContext::background();
        let (reader, out, err) = combined_pipe().unwrap();
        let mut proc = ManagedProcess::spawn(
            &request(&ctx, &["sh", "-c", "echo out; echo err >&2"]),
            out,
            err,
        )
        .unwrap();

        let (status, bytes) = proc.wait_with(&ctx, read_all(Some(reader))).await.unwrap();

        assert!(status.is_success());
        assert_eq!(bytes, b"out\nerr\n");
    }

    #[tokio::test]
    async fn context_terminates_sleeping_process() {
        let ctx = RunContext::with_timeout(Duration::from_millis(50));
        let mut proc = ManagedProcess::spawn(
            &request(&ctx, &["sleep", "60"]),
            Stdio::null(),
            Stdio::null(),
        )
        .unwrap();

        let err = proc.wait_with(&ctx, async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, CommandError::DeadlineExceeded { .. }));

        // Reaped: the pid no longer refers to a live process.
        let pid = Pid::from_raw(proc.pid().unwrap() as i32);
        assert!(signal::kill(pid, None).is_err());
    }
}
