//! Fixed filesystem locations used by the pipeline.
//!
//! Centralized so tests can point the whole pipeline at a temporary
//! directory.

use std::path::{Path, PathBuf};

/// Installer program files on the live ISO.
pub const LIVE_INSTALLER_DIR: &str = "/usr/local/bin/Installer";
/// Profile catalog on the live ISO.
pub const LIVE_PROFILES_DIR: &str = "/usr/local/bin/profiles";
/// Where the target root is mounted.
pub const MOUNT_POINT: &str = "/mnt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub mount_point: PathBuf,
    pub live_installer_dir: PathBuf,
    pub live_profiles_dir: PathBuf,
    /// Root of the live environment, source of resolv.conf and mirrorlist.
    pub host_root: PathBuf,
}

impl Default for InstallPaths {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(MOUNT_POINT),
            live_installer_dir: PathBuf::from(LIVE_INSTALLER_DIR),
            live_profiles_dir: PathBuf::from(LIVE_PROFILES_DIR),
            host_root: PathBuf::from("/"),
        }
    }
}

impl InstallPaths {
    /// Everything under `root`: `root/mnt`, `root/usr/local/bin/...`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            mount_point: root.join("mnt"),
            live_installer_dir: reroot(root, LIVE_INSTALLER_DIR),
            live_profiles_dir: reroot(root, LIVE_PROFILES_DIR),
            host_root: root.to_path_buf(),
        }
    }

    /// Path of an absolute target path (`/etc/hostname`) under the mount point.
    pub fn target(&self, absolute: &str) -> PathBuf {
        reroot(&self.mount_point, absolute)
    }

    pub fn host(&self, absolute: &str) -> PathBuf {
        reroot(&self.host_root, absolute)
    }

    pub fn boot_mount(&self) -> PathBuf {
        self.target("/boot/efi")
    }

    pub fn swap_file(&self) -> PathBuf {
        self.target("/swapfile")
    }

    pub fn target_installer_dir(&self) -> PathBuf {
        self.target(LIVE_INSTALLER_DIR)
    }

    pub fn target_profiles_dir(&self) -> PathBuf {
        self.target(LIVE_PROFILES_DIR)
    }
}

fn reroot(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let paths = InstallPaths::default();
        assert_eq!(paths.target("/etc/hostname"), PathBuf::from("/mnt/etc/hostname"));
        assert_eq!(paths.boot_mount(), PathBuf::from("/mnt/boot/efi"));
        assert_eq!(paths.swap_file(), PathBuf::from("/mnt/swapfile"));
        assert_eq!(
            paths.target_profiles_dir(),
            PathBuf::from("/mnt/usr/local/bin/profiles")
        );
        assert_eq!(paths.host("/etc/resolv.conf"), PathBuf::from("/etc/resolv.conf"));
    }

    #[test]
    fn test_rooted_paths_stay_inside_root() {
        let paths = InstallPaths::rooted_at(Path::new("/tmp/gx"));
        assert_eq!(paths.mount_point, PathBuf::from("/tmp/gx/mnt"));
        assert_eq!(
            paths.live_installer_dir,
            PathBuf::from("/tmp/gx/usr/local/bin/Installer")
        );
        assert_eq!(
            paths.host("/etc/pacman.d/mirrorlist"),
            PathBuf::from("/tmp/gx/etc/pacman.d/mirrorlist")
        );
    }
}
