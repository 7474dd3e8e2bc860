//! Engine modules: the privileged steps of an installation.
//!
//! Each module owns one slice of the pipeline and talks to the OS only
//! through a [`CommandRunner`](crate::command_runner::CommandRunner) and
//! plain file writes under the target root. Sequencing and progress belong
//! to the installer; nothing here reports progress itself.

pub mod bootstrap;
pub mod configure;
pub mod finalize;
pub mod partition;
pub mod storage;

use std::fs;
use std::path::Path;

use crate::error::{InstallationError, Result, Stage};

/// Write `contents` to `path`, creating parent directories as needed.
pub(crate) fn write_file(stage: Stage, path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            InstallationError::io(stage, format!("creating {}", parent.display()), e)
        })?;
    }
    fs::write(path, contents)
        .map_err(|e| InstallationError::io(stage, format!("writing {}", path.display()), e))
}
