//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before `install` touches anything:
//! - Running with root privileges (EUID 0)
//! - Required tools are on `PATH`
//! - Live ISO and UEFI firmware (warnings only)

use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::hardware::{FirmwareMode, detect_firmware_mode};

/// Present on the Arch live ISO.
pub const ARCHISO_MARKER: &str = "/run/archiso";

/// Tools the pipeline invokes.
const REQUIRED_BINARIES: &[&str] = &[
    "pacstrap",    // Base system bootstrap (arch-install-scripts)
    "arch-chroot", // Chroot-scoped execution (arch-install-scripts)
    "genfstab",    // fstab generation (arch-install-scripts)
    "sgdisk",      // GPT partitioning (gptfdisk)
    "wipefs",      // Signature removal (util-linux)
    "partprobe",   // Partition table re-read (parted)
    "mkfs.fat",    // EFI partition (dosfstools)
    "mkfs.ext4",   // Root filesystem (e2fsprogs)
    "mkfs.btrfs",  // Root filesystem (btrfs-progs)
    "mkfs.xfs",    // Root filesystem (xfsprogs)
    "mkfs.f2fs",   // Root filesystem (f2fs-tools)
    "fallocate",   // Swap file allocation (util-linux)
    "mkswap",      // Swap signature (util-linux)
    "lsblk",       // Block device listing (util-linux)
    "mount",
    "umount",
];

#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    pub warnings: Vec<String>,
}

impl SanityCheckResult {
    /// Warnings never fail the check.
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// First executable named `name` in a `PATH`-style list.
pub fn find_in_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Required binaries missing from `path_var`.
pub fn missing_binaries(path_var: &OsStr) -> Vec<String> {
    REQUIRED_BINARIES
        .iter()
        .filter(|b| find_in_path(b, path_var).is_none())
        .map(|b| b.to_string())
        .collect()
}

/// Run every check against the live system.
pub fn verify_environment() -> SanityCheckResult {
    let path_var = env::var_os("PATH").unwrap_or_default();
    let mut warnings = Vec::new();

    if !Path::new(ARCHISO_MARKER).exists() {
        warnings.push("Not running from the Arch live ISO".to_string());
    }
    if detect_firmware_mode(Path::new("/sys")) == FirmwareMode::Bios {
        warnings.push("BIOS firmware detected; the GRUB EFI install will fail".to_string());
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    SanityCheckResult {
        missing_binaries: missing_binaries(&path_var),
        is_root: is_running_as_root(),
        warnings,
    }
}

/// Print a failed check to stderr.
pub fn print_error(result: &SanityCheckResult) {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              GamerX Installer - Pre-flight Check Failed          ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();

    if !result.is_root {
        eprintln!("❌ ERROR: Root privileges required");
        eprintln!("   This installer must be run as root to partition disks and install packages.");
        eprintln!();
        eprintln!("   Solution: Run with sudo or as root user:");
        eprintln!("     sudo gxinstall install --config <file>");
        eprintln!();
    }

    if !result.missing_binaries.is_empty() {
        eprintln!("❌ ERROR: Missing required binaries");
        eprintln!();
        for binary in &result.missing_binaries {
            eprintln!("   • {} (install: pacman -S {})", binary, package_for_binary(binary));
        }
        eprintln!();
        let mut packages: Vec<&str> = result
            .missing_binaries
            .iter()
            .map(|b| package_for_binary(b))
            .collect();
        packages.sort_unstable();
        packages.dedup();
        eprintln!("   Solution: Install missing packages:");
        eprintln!("     pacman -S {}", packages.join(" "));
        eprintln!();
    }
}

/// Arch package providing `binary`.
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "pacstrap" | "arch-chroot" | "genfstab" => "arch-install-scripts",
        "sgdisk" => "gptfdisk",
        "partprobe" => "parted",
        "mkfs.fat" => "dosfstools",
        "mkfs.ext4" => "e2fsprogs",
        "mkfs.btrfs" => "btrfs-progs",
        "mkfs.xfs" => "xfsprogs",
        "mkfs.f2fs" => "f2fs-tools",
        "wipefs" | "lsblk" | "mount" | "umount" | "fallocate" | "mkswap" => "util-linux",
        _ => "unknown",
    }
}

/// Set `GXINSTALL_SKIP_ROOT_CHECK=1` to skip the root check.
pub fn should_skip_root_check() -> bool {
    env::var("GXINSTALL_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Verify the environment; `true` when installation may proceed.
pub fn run_preflight_checks(skip_root: bool) -> bool {
    debug!("Running pre-flight sanity checks (skip_root={})...", skip_root);

    let mut result = verify_environment();
    if skip_root || should_skip_root_check() {
        warn!("Root check skipped");
        result.is_root = true;
    }

    if !result.is_ok() {
        print_error(&result);
        return false;
    }

    info!("Pre-flight checks passed");
    true
}
