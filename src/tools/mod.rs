//! Type-safe argument contracts for external tools.
//!
//! Each tool the pipeline invokes has a struct implementing [`ToolArgs`].
//! The struct is the single source of truth for the argv, so a flag typo
//! (`-F32` vs `-F 32`, `--efi-directory` vs `--efi-dir`) shows up in one
//! place with a unit test next to it.

pub mod disk;
pub mod system;

use std::time::Duration;

use crate::command_runner::CommandSpec;

/// Trait for typed tool arguments.
///
/// # Contract
///
/// - `program()`: binary name, resolved through `PATH` at execution time.
/// - `to_cli_args()`: arguments exactly as the tool expects them.
/// - `stdin()`: data piped to the tool (passwords go here, never in argv).
/// - `timeout()`: wall-clock limit for tools that can hang.
/// - `is_destructive()`: false only for read-only queries.
pub trait ToolArgs {
    fn program(&self) -> &'static str;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn stdin(&self) -> Option<String> {
        None
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn to_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program()).args(self.to_cli_args());
        spec.env = self.get_env_vars();
        spec.stdin = self.stdin();
        spec.timeout = self.timeout();
        spec.destructive = self.is_destructive();
        spec
    }
}

pub(crate) fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
