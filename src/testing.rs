//! Test doubles for the tool layer.
//!
//! [`ScriptedRunner`] records every [`CommandSpec`] it receives and answers
//! from a list of rules. The first matching rule wins (most recently added
//! first); anything unmatched succeeds with empty output.

use std::sync::Mutex;
use std::time::Duration;

use crate::command_runner::{CommandOutput, CommandRunner, CommandSpec, RunError};

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Timeout,
    SpawnError,
}

struct Rule {
    matcher: Matcher,
    response: Response,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands matching `matcher` with `output`.
    pub fn respond<F>(self, matcher: F, output: CommandOutput) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.push(Box::new(matcher), Response::Output(output))
    }

    /// Answer lsblk queries for `device` as a disk of `size_gb` gigabytes.
    /// A mounted disk reports `/mnt` as one of its mount points.
    pub fn with_disk(self, device: &str, size_gb: u64, mounted: bool) -> Self {
        let bytes = size_gb * 1024 * 1024 * 1024;
        let size_device = device.to_string();
        let mount_device = device.to_string();
        self.respond(
            move |spec| is_lsblk_query(spec, "SIZE,MODEL", &size_device),
            CommandOutput::success(format!("{} Test Disk\n", bytes)),
        )
        .respond(
            move |spec| is_lsblk_query(spec, "MOUNTPOINT", &mount_device),
            CommandOutput::success(if mounted { "\n/mnt\n" } else { "\n\n" }),
        )
    }

    /// Fail `program` with `code` and `stderr` when any argument contains
    /// `arg_contains` (an empty string matches every invocation).
    pub fn fail_when(self, program: &str, arg_contains: &str, code: i32, stderr: &str) -> Self {
        let matcher = arg_matcher(program, arg_contains);
        self.push(matcher, Response::Output(CommandOutput::failure(code, stderr)))
    }

    /// Report a timeout for matching invocations.
    pub fn timeout_when(self, program: &str, arg_contains: &str) -> Self {
        let matcher = arg_matcher(program, arg_contains);
        self.push(matcher, Response::Timeout)
    }

    /// Report a spawn failure for matching invocations.
    pub fn missing_binary(self, program: &str) -> Self {
        let matcher = arg_matcher(program, "");
        self.push(matcher, Response::SpawnError)
    }

    fn push(self, matcher: Matcher, response: Response) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Rule { matcher, response });
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    pub fn invoked(&self, program: &str) -> bool {
        self.calls().iter().any(|c| c.program == program)
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    /// Index of the first invocation whose command line contains `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.command_lines().iter().position(|l| l.contains(needle))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let response = {
            let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            rules
                .iter()
                .rev()
                .find(|rule| (rule.matcher)(spec))
                .map(|rule| rule.response.clone())
        };

        match response {
            None => Ok(CommandOutput::success("")),
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Timeout) => Err(RunError::TimedOut {
                program: spec.program.clone(),
                after: spec.timeout.unwrap_or(Duration::from_secs(1)),
            }),
            Some(Response::SpawnError) => Err(RunError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }
}

fn is_lsblk_query(spec: &CommandSpec, columns: &str, device: &str) -> bool {
    spec.program == "lsblk"
        && spec.args.iter().any(|a| a == columns)
        && spec.args.last().is_some_and(|a| a == device)
}

fn arg_matcher(program: &str, arg_contains: &str) -> Matcher {
    let program = program.to_string();
    let needle = arg_contains.to_string();
    Box::new(move |spec: &CommandSpec| {
        spec.program == program
            && (needle.is_empty() || spec.args.iter().any(|a| a.contains(&needle)))
    })
}
