//! Final steps: bootloader, extra packages, flushing writes.

use tracing::info;

use crate::command_runner::{CommandRunner, StageRunner};
use crate::error::{Result, Stage};
use crate::paths::InstallPaths;
use crate::tools::ToolArgs;
use crate::tools::system::{
    GrubInstall, GrubMkconfig, InChroot, PacmanInstall, PacmanRefresh, SyncDisks,
};

pub struct Finalizer<'a> {
    runner: StageRunner<'a>,
    paths: &'a InstallPaths,
}

impl<'a> Finalizer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a InstallPaths) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Finalize),
            paths,
        }
    }

    fn chroot(&self, tool: &dyn ToolArgs) -> Result<()> {
        self.runner
            .run(&InChroot::new(&self.paths.mount_point, tool))
            .map(|_| ())
    }

    /// GRUB for x86_64 EFI, installed to the removable media path.
    pub fn install_bootloader(&self) -> Result<()> {
        self.chroot(&GrubInstall)?;
        self.chroot(&GrubMkconfig)?;
        info!("GRUB bootloader installed");
        Ok(())
    }

    /// Refresh the package databases and install `packages`. Packages
    /// already present are left alone.
    pub fn install_packages(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.chroot(&PacmanRefresh)?;
        self.chroot(&PacmanInstall {
            packages: packages.to_vec(),
        })?;
        info!("Additional packages installed: {}", packages.join(" "));
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.runner.run(&SyncDisks).map(|_| ())
    }
}
