//! Mock command factory for testing

use async_trait::async_trait;
use cmdrun_util::{CommandError, CommandResult, ExitStatus};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::{CommandFactory, CommandRequest, OutputSink, Runnable};

/// Scripted result of a mock run
#[derive(Debug, Clone)]
pub struct MockOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,

    /// Fail as if the program could not be found
    pub fail_launch: bool,

    /// Simulated run time, interruptible by the bound context
    pub delay: Option<Duration>,
}

impl MockOutcome {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stderr: stderr.into(),
            status: ExitStatus::with_code(code),
            ..Self::default()
        }
    }

    pub fn launch_failure() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for MockOutcome {
    fn default() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: ExitStatus::success(),
            fail_launch: false,
            delay: None,
        }
    }
}

#[derive(Default)]
struct MockState {
    outcomes: Mutex<HashMap<String, MockOutcome>>,
    default_outcome: Mutex<MockOutcome>,
    requests: Mutex<Vec<CommandRequest>>,
    invocations: AtomicU64,
}

/// Mock command factory for unit/integration testing.
///
/// Outcomes are looked up by program name when a run method is called, so
/// they may be changed after runnables have been handed out.
#[derive(Clone, Default)]
pub struct MockCommandFactory {
    state: Arc<MockState>,
}

impl MockCommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, program: impl Into<String>, outcome: MockOutcome) -> Self {
        self.set_outcome(program, outcome);
        self
    }

    pub fn set_outcome(&self, program: impl Into<String>, outcome: MockOutcome) {
        self.state
            .outcomes
            .lock()
            .unwrap()
            .insert(program.into(), outcome);
    }

    /// Outcome for programs without a specific entry
    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        *self.state.default_outcome.lock().unwrap() = outcome;
    }

    /// Every request handed to this factory, in creation order
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of run method calls across all runnables
    pub fn invocation_count(&self) -> u64 {
        self.state.invocations.load(Ordering::SeqCst)
    }
}

impl CommandFactory for MockCommandFactory {
    fn prepare(&self, request: CommandRequest) -> Box<dyn Runnable> {
        self.state.requests.lock().unwrap().push(request.clone());
        Box::new(MockRunnable {
            request,
            state: self.state.clone(),
        })
    }
}

/// Runnable produced by [`MockCommandFactory`]
pub struct MockRunnable {
    request: CommandRequest,
    state: Arc<MockState>,
}

impl MockRunnable {
    async fn execute(&self) -> CommandResult<MockOutcome> {
        self.state.invocations.fetch_add(1, Ordering::SeqCst);

        let program = self.request.program();
        let ctx = self.request.context();
        if let Some(err) = ctx.err() {
            return Err(CommandError::from_context(program, err));
        }

        let outcome = {
            let outcomes = self.state.outcomes.lock().unwrap();
            match outcomes.get(program) {
                Some(outcome) => outcome.clone(),
                None => self.state.default_outcome.lock().unwrap().clone(),
            }
        };

        if outcome.fail_launch {
            return Err(CommandError::launch(
                program,
                io::Error::new(io::ErrorKind::NotFound, "mock launch failure"),
            ));
        }

        if let Some(delay) = outcome.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                err = ctx.done() => return Err(CommandError::from_context(program, err)),
            }
        }

        Ok(outcome)
    }

    fn check_status(&self, outcome: &MockOutcome, stderr: &[u8]) -> CommandResult<()> {
        if outcome.status.is_success() {
            return Ok(());
        }

        Err(CommandError::NonZeroExit {
            program: self.request.program().to_string(),
            status: outcome.status,
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Runnable for MockRunnable {
    fn request(&self) -> &CommandRequest {
        &self.request
    }

    async fn run(&self) -> CommandResult<()> {
        let outcome = self.execute().await?;
        self.check_status(&outcome, &[])
    }

    async fn run_stdout(&self) -> CommandResult<Vec<u8>> {
        let outcome = self.execute().await?;
        self.check_status(&outcome, &outcome.stderr)?;
        Ok(outcome.stdout)
    }

    async fn run_combined(&self) -> CommandResult<Vec<u8>> {
        let outcome = self.execute().await?;
        self.check_status(&outcome, &[])?;

        let mut combined = outcome.stdout;
        combined.extend_from_slice(&outcome.stderr);
        Ok(combined)
    }

    async fn run_to_writer(
        &self,
        stdout: Option<&mut OutputSink>,
        stderr: Option<&mut OutputSink>,
    ) -> CommandResult<()> {
        let outcome = self.execute().await?;
        let program = self.request.program();

        for (sink, bytes) in [(stdout, &outcome.stdout), (stderr, &outcome.stderr)] {
            if let Some(sink) = sink {
                sink.write_all(bytes)
                    .await
                    .map_err(|e| CommandError::io(program, e))?;
                sink.flush().await.map_err(|e| CommandError::io(program, e))?;
            }
        }

        self.check_status(&outcome, &[])
    }
}
