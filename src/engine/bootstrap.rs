//! Base system bootstrap into the mounted target root.
//!
//! Four independently fatal steps, all tagged [`Stage::Bootstrap`]:
//! pacstrap the package set, write a UUID-keyed fstab, carry DNS and mirror
//! configuration over, and copy the installer and profile catalog into the
//! target so chrooted profile scripts can find them.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::write_file;
use crate::command_runner::{CommandRunner, StageRunner};
use crate::error::{InstallationError, Result, Stage};
use crate::paths::InstallPaths;
use crate::tools::system::{Genfstab, Pacstrap};
use crate::types::Kernel;

pub const MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";
pub const RESOLV_CONF: &str = "/etc/resolv.conf";
pub const FSTAB: &str = "/etc/fstab";

/// fstab line activating the swap file on the installed system.
pub const SWAP_FSTAB_ENTRY: &str = "/swapfile none swap defaults 0 0";

pub struct SystemBootstrapper<'a> {
    runner: StageRunner<'a>,
    paths: &'a InstallPaths,
}

impl<'a> SystemBootstrapper<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a InstallPaths) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Bootstrap),
            paths,
        }
    }

    /// pacstrap the base set for `kernel` plus `extras`.
    ///
    /// A hung pacstrap surfaces as a timeout failure, distinct from a
    /// non-zero exit.
    pub fn install_base(&self, kernel: Kernel, extras: &[String]) -> Result<()> {
        let pacstrap = Pacstrap::base_system(&self.paths.mount_point, kernel, extras);
        info!("Installing {} packages with pacstrap", pacstrap.packages.len());
        self.runner.run(&pacstrap)?;
        info!("Base system installed");
        Ok(())
    }

    /// Write the target fstab from `genfstab -U`. Returns the number of
    /// mount entries written.
    pub fn generate_fstab(&self, with_swap_file: bool) -> Result<usize> {
        let output = self.runner.run(&Genfstab {
            root: self.paths.mount_point.clone(),
        })?;

        let mut fstab = output.stdout;
        if with_swap_file {
            if !fstab.is_empty() && !fstab.ends_with('\n') {
                fstab.push('\n');
            }
            fstab.push_str(SWAP_FSTAB_ENTRY);
            fstab.push('\n');
        }

        let entries = fstab
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .count();
        write_file(Stage::Bootstrap, &self.paths.target(FSTAB), &fstab)?;
        info!("fstab generated: {} entries", entries);
        Ok(entries)
    }

    /// DNS config and mirror list for the chroot. A selected mirror becomes
    /// the only `Server` entry; otherwise the host's list is copied as is.
    pub fn configure_network(&self, mirror_url: Option<&str>) -> Result<()> {
        let resolv = self.paths.host(RESOLV_CONF);
        if resolv.exists() {
            self.copy_file(&resolv, &self.paths.target(RESOLV_CONF))?;
            info!("DNS configuration copied");
        } else {
            debug!("{} not present on host, skipping", resolv.display());
        }

        let target_mirrorlist = self.paths.target(MIRRORLIST);
        match mirror_url {
            Some(url) => {
                write_file(Stage::Bootstrap, &target_mirrorlist, &mirrorlist_for(url))?;
                info!("Mirror configured: {}", url);
            }
            None => {
                let host_mirrorlist = self.paths.host(MIRRORLIST);
                if host_mirrorlist.exists() {
                    self.copy_file(&host_mirrorlist, &target_mirrorlist)?;
                    info!("Current mirrorlist copied");
                } else {
                    warn!("No mirror selected and {} not found", host_mirrorlist.display());
                }
            }
        }
        Ok(())
    }

    /// Replace the target's copies of the installer and profile catalog.
    /// A missing source directory is logged and skipped.
    pub fn copy_installer_files(&self) -> Result<()> {
        let pairs = [
            (&self.paths.live_installer_dir, self.paths.target_installer_dir()),
            (&self.paths.live_profiles_dir, self.paths.target_profiles_dir()),
        ];
        for (source, target) in pairs {
            if !source.is_dir() {
                warn!("Source directory not found: {}", source.display());
                continue;
            }
            if target.exists() {
                fs::remove_dir_all(&target).map_err(|e| self.io_error(&target, e))?;
            }
            let copied = copy_tree(source, &target).map_err(|e| self.io_error(&target, e))?;
            info!(
                "Copied {} files: {} -> {}",
                copied,
                source.display(),
                target.display()
            );
        }
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        fs::copy(from, to).map_err(|e| self.io_error(to, e))?;
        Ok(())
    }

    fn io_error(&self, path: &Path, source: io::Error) -> InstallationError {
        InstallationError::io(self.runner.stage(), format!("copying to {}", path.display()), source)
    }
}

/// Mirror list with `url` as its only server.
pub fn mirrorlist_for(url: &str) -> String {
    format!("# GamerX Installer - Selected Mirror\nServer = {}\n", url)
}

/// Recursively copy `source` to `target`, keeping file modes and
/// recreating symlinks. Returns the number of files copied.
fn copy_tree(source: &Path, target: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let dest = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}
