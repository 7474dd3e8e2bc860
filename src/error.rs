//! Error types for the installation pipeline
//!
//! Every fatal failure is an [`InstallationError`]: a [`Stage`] tag plus an
//! [`ErrorKind`] carrying the diagnostic (validation reason, tool exit status
//! and stderr, or the I/O error behind a file write).

use std::io;
use std::time::Duration;

use strum::{Display, EnumIter};
use thiserror::Error;

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Stage {
    #[strum(serialize = "config-validation")]
    ConfigValidation,
    #[strum(serialize = "disk")]
    Disk,
    #[strum(serialize = "bootstrap")]
    Bootstrap,
    #[strum(serialize = "configure")]
    Configure,
    #[strum(serialize = "profile")]
    Profile,
    #[strum(serialize = "finalize")]
    Finalize,
}

impl Stage {
    /// Profile failures are recorded and the run continues.
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Profile)
    }
}

/// How an external tool failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("exited with {}: {}", exit_label(.code), .stderr.trim())]
    Exit { code: Option<i32>, stderr: String },

    #[error("timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("could not be run: {reason}")]
    Spawn { reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// The diagnostic carried by an [`InstallationError`].
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("{0}")]
    Invalid(String),

    #[error("`{command}` {failure}")]
    Tool {
        command: String,
        failure: ToolFailure,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// A stage-tagged installation failure.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {kind}")]
pub struct InstallationError {
    pub stage: Stage,
    #[source]
    pub kind: ErrorKind,
}

pub type Result<T> = std::result::Result<T, InstallationError>;

impl InstallationError {
    pub fn invalid(stage: Stage, msg: impl Into<String>) -> Self {
        Self {
            stage,
            kind: ErrorKind::Invalid(msg.into()),
        }
    }

    pub fn tool(stage: Stage, command: impl Into<String>, failure: ToolFailure) -> Self {
        Self {
            stage,
            kind: ErrorKind::Tool {
                command: command.into(),
                failure,
            },
        }
    }

    pub fn io(stage: Stage, context: impl Into<String>, source: io::Error) -> Self {
        Self {
            stage,
            kind: ErrorKind::Io {
                context: context.into(),
                source,
            },
        }
    }

    /// The tool failure behind this error, if a tool caused it.
    pub fn tool_failure(&self) -> Option<&ToolFailure> {
        match &self.kind {
            ErrorKind::Tool { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.tool_failure(), Some(ToolFailure::Timeout { .. }))
    }
}
