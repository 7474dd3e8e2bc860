//! External tool execution
//!
//! The pipeline never builds `std::process::Command` itself. Every tool
//! invocation is a [`CommandSpec`] (argv, optional stdin, optional timeout)
//! handed to a [`CommandRunner`], which answers with a [`CommandOutput`]
//! (exit code, stdout, stderr). Production uses [`SystemRunner`]; tests use
//! `testing::ScriptedRunner`.
//!
//! Stage code goes through [`StageRunner`], which turns non-zero exits,
//! timeouts and spawn errors into stage-tagged `InstallationError`s and logs
//! each invocation.

use std::fmt;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{InstallationError, Stage, ToolFailure};
use crate::process_guard::{CommandProcessGroup, TrackedChild, kill_process_group};
use crate::tools::ToolArgs;

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Written to the tool's stdin, then stdin is closed. Never logged.
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
    /// False only for read-only queries; dry-run skips destructive commands.
    pub destructive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            timeout: None,
            destructive: true,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments, space separated.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Result of a tool that ran to completion (successfully or not).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the tool was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Failures where the tool did not produce an exit status.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<RunError> for ToolFailure {
    fn from(err: RunError) -> Self {
        match err {
            RunError::TimedOut { after, .. } => ToolFailure::Timeout { after },
            other => ToolFailure::Spawn {
                reason: other.to_string(),
            },
        }
    }
}

/// Narrow seam between the pipeline and the OS.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError>;
}

/// Spawns real processes, isolated in their own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        let io_err = |source| RunError::Io {
            program: spec.program.clone(),
            source,
        };

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        let _tracked = TrackedChild::new(pid);

        let stdin_writer = match (spec.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(thread::spawn(move || {
                pipe.write_all(input.as_bytes())
            })),
            _ => None,
        };
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match spec.timeout {
            Some(limit) => wait_with_deadline(&mut child, pid, limit).map_err(io_err)?,
            None => Some(child.wait().map_err(io_err)?),
        };

        if let Some(writer) = stdin_writer {
            if let Ok(Err(e)) = writer.join() {
                debug!("{}: stdin closed early: {}", spec.program, e);
            }
        }
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        match status {
            Some(status) => Ok(CommandOutput {
                exit_code: status.code(),
                stdout,
                stderr,
            }),
            None => Err(RunError::TimedOut {
                program: spec.program.clone(),
                after: spec.timeout.unwrap_or_default(),
            }),
        }
    }
}

/// `Ok(None)` means the deadline passed and the group was killed.
fn wait_with_deadline(
    child: &mut Child,
    pid: u32,
    limit: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            warn!("Process group {} exceeded {}s, killing it", pid, limit.as_secs());
            kill_process_group(pid);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Logs destructive commands instead of running them; queries still run.
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: CommandRunner> CommandRunner for DryRunRunner<R> {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        if spec.destructive {
            info!("[dry-run] would run: {}", spec);
            Ok(CommandOutput::success(""))
        } else {
            self.inner.run(spec)
        }
    }
}

/// A runner bound to one pipeline stage.
#[derive(Clone, Copy)]
pub struct StageRunner<'a> {
    runner: &'a dyn CommandRunner,
    stage: Stage,
}

impl<'a> StageRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, stage: Stage) -> Self {
        Self { runner, stage }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run a tool; anything but exit status 0 is a stage error.
    pub fn run(&self, tool: &dyn ToolArgs) -> crate::error::Result<CommandOutput> {
        let spec = tool.to_spec();
        info!(stage = %self.stage, "Running: {}", spec);
        let command = spec.command_line();

        let output = self.runner.run(&spec).map_err(|e| {
            warn!(stage = %self.stage, "{}", e);
            InstallationError::tool(self.stage, command.clone(), e.into())
        })?;

        if output.is_success() {
            Ok(output)
        } else {
            warn!(
                stage = %self.stage,
                "`{}` failed (exit code {}): {}",
                command,
                output.exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output.stderr.trim()
            );
            Err(InstallationError::tool(
                self.stage,
                command,
                ToolFailure::Exit {
                    code: output.exit_code,
                    stderr: output.stderr,
                },
            ))
        }
    }

    /// Run a tool whose failure is tolerated. Returns whether it succeeded.
    pub fn run_best_effort(&self, tool: &dyn ToolArgs) -> bool {
        match self.run(tool) {
            Ok(_) => true,
            Err(e) => {
                warn!(stage = %self.stage, "Ignoring failure: {}", e);
                false
            }
        }
    }

    /// Run a read-only query and return its output whatever the exit status.
    pub fn query(&self, tool: &dyn ToolArgs) -> crate::error::Result<CommandOutput> {
        let spec = tool.to_spec();
        debug!(stage = %self.stage, "Querying: {}", spec);
        let command = spec.command_line();
        self.runner
            .run(&spec)
            .map_err(|e| InstallationError::tool(self.stage, command, e.into()))
    }
}
