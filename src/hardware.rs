//! Host facts needed by the planner
//!
//! RAM size drives the "auto" swap policy, and the firmware mode decides
//! whether the EFI bootloader install can work at all. Both are read from
//! procfs/sysfs directly, no shelling out.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Source of the host's total RAM.
///
/// `DiskPlanner` takes this as a trait object so tests can pin the RAM size.
pub trait MemoryInfo {
    /// Total RAM in whole gigabytes, or `None` if it cannot be read.
    fn total_ram_gb(&self) -> Option<u64>;
}

/// Reads `MemTotal` from a meminfo file (`/proc/meminfo` by default).
#[derive(Debug, Clone)]
pub struct ProcMeminfo {
    path: PathBuf,
}

impl ProcMeminfo {
    pub fn new() -> Self {
        Self::at("/proc/meminfo")
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMeminfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInfo for ProcMeminfo {
    fn total_ram_gb(&self) -> Option<u64> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let gb = parse_mem_total_gb(&contents);
                if gb.is_none() {
                    warn!("No MemTotal line in {}", self.path.display());
                }
                gb
            }
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// A fixed RAM size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemory(pub Option<u64>);

impl MemoryInfo for FixedMemory {
    fn total_ram_gb(&self) -> Option<u64> {
        self.0
    }
}

/// Parse the `MemTotal:` line (kB) into whole gigabytes.
pub fn parse_mem_total_gb(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    let gb = kb / (1024 * 1024);
    debug!("MemTotal {} kB = {} GB", kb, gb);
    Some(gb)
}

/// Detected firmware mode of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl FirmwareMode {
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// The kernel exposes `<sysfs>/firmware/efi` only when booted via UEFI.
pub fn detect_firmware_mode(sysfs_root: &Path) -> FirmwareMode {
    let efi = sysfs_root.join("firmware/efi");
    let mode = if efi.exists() {
        FirmwareMode::Uefi
    } else {
        FirmwareMode::Bios
    };
    let presence = if mode.is_uefi() { "exists" } else { "missing" };
    info!("Firmware mode: {} ({} {})", mode, efi.display(), presence);
    mode
}
