//! Disk Planning Engine
//!
//! Checks a target block device against the installation's space and
//! mount constraints and derives the partition layout and swap size.
//!
//! # Rules
//!
//! Applied in order, stopping at the first failure:
//!
//! | # | Rule                                   | Rejection           |
//! |---|----------------------------------------|---------------------|
//! | 1 | `lsblk` reports size and model         | `NotQueryable`      |
//! | 2 | size >= 20GB                           | `TooSmall`          |
//! | 3 | nothing on the device is mounted       | `Mounted`           |
//! | 4 | size >= 10 + 1 + swap + 5 GB           | `InsufficientSpace` |
//!
//! # Design
//!
//! - **Read-only**: only `lsblk` queries run here, never a destructive tool
//! - **Rejections are values**: an unsuitable disk is `Ok(DiskCheck::Unsuitable)`;
//!   `Err` is reserved for the query itself failing to run
//! - **Swap is resolved once**: the plan carries whole gigabytes, the executor
//!   never looks at RAM or the policy again

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::command_runner::{CommandRunner, StageRunner};
use crate::config_file::InstallConfig;
use crate::error::{InstallationError, Result, Stage};
use crate::hardware::MemoryInfo;
use crate::tools::disk::Lsblk;
use crate::types::{Filesystem, SwapPolicy};

// ============================================================================
// Sizing Constants
// ============================================================================

pub const MIN_DISK_GB: u64 = 20;
pub const BASE_SYSTEM_GB: u64 = 10;
pub const BOOT_RESERVE_GB: u64 = 1;
pub const BUFFER_GB: u64 = 5;
/// Upper bound for the "auto" swap policy.
pub const AUTO_SWAP_CAP_GB: u64 = 8;
/// "auto" swap size when RAM cannot be read.
pub const AUTO_SWAP_FALLBACK_GB: u64 = 2;

pub const BOOT_PARTITION_MIB: u64 = 512;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Swap size in whole gigabytes for `policy` on a host with `ram_gb`.
pub fn resolve_swap_gb(policy: SwapPolicy, ram_gb: Option<u64>) -> u64 {
    match policy {
        SwapPolicy::None => 0,
        SwapPolicy::Fixed(gb) => gb,
        SwapPolicy::Auto => ram_gb
            .map(|ram| ram.min(AUTO_SWAP_CAP_GB))
            .unwrap_or(AUTO_SWAP_FALLBACK_GB),
    }
}

/// Space the installation needs on a disk with `swap_gb` of swap, or `None`
/// when the sum does not fit in a `u64`.
pub const fn required_space_gb(swap_gb: u64) -> Option<u64> {
    (BASE_SYSTEM_GB + BOOT_RESERVE_GB + BUFFER_GB).checked_add(swap_gb)
}

// ============================================================================
// Plan Types
// ============================================================================

/// Half-open byte range `[start, end)` on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition layout for one installation attempt.
///
/// ```text
/// <dev>1 - EFI System Partition, 512M, FAT32, [1MiB, 513MiB)
/// <dev>2 - root, selected filesystem, [513MiB, size - 1MiB)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskPlan {
    pub device: PathBuf,
    pub model: String,
    pub size_bytes: u64,
    pub size_gb: u64,
    pub swap_gb: u64,
    pub required_gb: u64,
    pub boot: ByteRange,
    pub root: ByteRange,
    pub filesystem: Filesystem,
}

impl DiskPlan {
    pub fn with_filesystem(mut self, filesystem: Filesystem) -> Self {
        self.filesystem = filesystem;
        self
    }

    pub fn boot_partition(&self) -> PathBuf {
        partition_path(&self.device, 1)
    }

    pub fn root_partition(&self) -> PathBuf {
        partition_path(&self.device, 2)
    }

    pub fn free_gb(&self) -> u64 {
        self.size_gb.saturating_sub(self.required_gb)
    }

    pub fn summary(&self) -> String {
        let lines = [
            format!("Disk Plan: {} ({})", self.device.display(), self.model),
            format!("  Size: {}GB, required {}GB", self.size_gb, self.required_gb),
            format!(
                "  Boot: {} FAT32, {}MiB",
                self.boot_partition().display(),
                self.boot.len() / MIB
            ),
            format!(
                "  Root: {} {}, {}GB",
                self.root_partition().display(),
                self.filesystem,
                self.root.len() / GIB
            ),
            format!("  Swap file: {}GB", self.swap_gb),
        ];
        lines.join("\n")
    }
}

/// Why a device cannot take the installation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiskRejection {
    #[error("Could not query disk: {reason}")]
    NotQueryable { reason: String },

    #[error("Disk too small: {size_gb}GB (minimum {MIN_DISK_GB}GB required)")]
    TooSmall { size_gb: u64 },

    #[error("Disk is currently mounted and in use")]
    Mounted,

    #[error(
        "Insufficient space: {available_gb}GB available, {required_gb}GB required \
         (including {swap_gb}GB swap), {shortfall_gb}GB short"
    )]
    InsufficientSpace {
        available_gb: u64,
        required_gb: u64,
        swap_gb: u64,
        shortfall_gb: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCheck {
    Suitable(DiskPlan),
    Unsuitable(DiskRejection),
}

impl DiskCheck {
    pub fn is_suitable(&self) -> bool {
        matches!(self, Self::Suitable(_))
    }

    pub fn plan(&self) -> Option<&DiskPlan> {
        match self {
            Self::Suitable(plan) => Some(plan),
            Self::Unsuitable(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&DiskRejection> {
        match self {
            Self::Suitable(_) => None,
            Self::Unsuitable(rejection) => Some(rejection),
        }
    }
}

impl fmt::Display for DiskCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suitable(plan) => write!(
                f,
                "Disk suitable: {}GB total, {}GB will remain free",
                plan.size_gb,
                plan.free_gb()
            ),
            Self::Unsuitable(rejection) => write!(f, "{}", rejection),
        }
    }
}

// ============================================================================
// Planner
// ============================================================================

pub struct DiskPlanner<'a> {
    runner: StageRunner<'a>,
    memory: &'a dyn MemoryInfo,
}

impl<'a> DiskPlanner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, memory: &'a dyn MemoryInfo) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Disk),
            memory,
        }
    }

    pub fn resolve_swap(&self, policy: SwapPolicy) -> u64 {
        let ram_gb = match policy {
            SwapPolicy::Auto => self.memory.total_ram_gb(),
            _ => None,
        };
        let swap_gb = resolve_swap_gb(policy, ram_gb);
        debug!("Swap policy {} resolved to {}GB (RAM: {:?}GB)", policy, swap_gb, ram_gb);
        swap_gb
    }

    /// Check `device` for an installation with the given swap policy.
    ///
    /// # Errors
    ///
    /// Only when `lsblk` cannot be run at all. Every rule violation is
    /// reported as [`DiskCheck::Unsuitable`].
    pub fn validate(&self, device: &Path, swap: SwapPolicy) -> Result<DiskCheck> {
        let device_buf = device.to_path_buf();

        let facts = self.runner.query(&Lsblk::SizeModel(device_buf.clone()))?;
        if !facts.is_success() {
            return Ok(DiskCheck::Unsuitable(DiskRejection::NotQueryable {
                reason: non_empty_or(facts.stderr.trim(), "lsblk failed"),
            }));
        }
        let Some((size_bytes, model)) = parse_size_model(&facts.stdout) else {
            return Ok(DiskCheck::Unsuitable(DiskRejection::NotQueryable {
                reason: format!("unexpected lsblk output '{}'", facts.stdout.trim()),
            }));
        };

        let size_gb = size_bytes / GIB;
        if size_gb < MIN_DISK_GB {
            return Ok(DiskCheck::Unsuitable(DiskRejection::TooSmall { size_gb }));
        }

        let mounts = self.runner.query(&Lsblk::Mountpoints(device_buf.clone()))?;
        if !mounts.is_success() {
            return Ok(DiskCheck::Unsuitable(DiskRejection::NotQueryable {
                reason: non_empty_or(mounts.stderr.trim(), "lsblk failed"),
            }));
        }
        if mounts.stdout.lines().any(|line| !line.trim().is_empty()) {
            return Ok(DiskCheck::Unsuitable(DiskRejection::Mounted));
        }

        let swap_gb = self.resolve_swap(swap);
        // No disk can hold an overflowing requirement.
        let required_gb = required_space_gb(swap_gb).unwrap_or(u64::MAX);
        if size_gb < required_gb {
            return Ok(DiskCheck::Unsuitable(DiskRejection::InsufficientSpace {
                available_gb: size_gb,
                required_gb,
                swap_gb,
                shortfall_gb: required_gb - size_gb,
            }));
        }

        let boot_start = MIB;
        let boot_end = boot_start + BOOT_PARTITION_MIB * MIB;
        let plan = DiskPlan {
            device: device_buf,
            model,
            size_bytes,
            size_gb,
            swap_gb,
            required_gb,
            boot: ByteRange {
                start: boot_start,
                end: boot_end,
            },
            root: ByteRange {
                start: boot_end,
                end: size_bytes - MIB,
            },
            filesystem: Filesystem::default(),
        };
        info!(
            "{} suitable: {}GB total, {}GB required, {}GB swap",
            device.display(),
            size_gb,
            required_gb,
            swap_gb
        );
        Ok(DiskCheck::Suitable(plan))
    }

    /// Validate the configured device and return its plan.
    ///
    /// # Errors
    ///
    /// A Disk-stage error carrying the rejection reason when the device is
    /// unsuitable.
    pub fn plan(&self, config: &InstallConfig) -> Result<DiskPlan> {
        let device = Path::new(&config.device);
        match self.validate(device, config.swap)? {
            DiskCheck::Suitable(plan) => Ok(plan.with_filesystem(config.filesystem)),
            DiskCheck::Unsuitable(rejection) => Err(InstallationError::invalid(
                Stage::Disk,
                format!("{}: {}", device.display(), rejection),
            )),
        }
    }
}

/// `"<bytes> <model words...>"` into size and model.
fn parse_size_model(stdout: &str) -> Option<(u64, String)> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let size = parts.next()?.parse().ok()?;
    let model = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown");
    Some((size, model.to_string()))
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

/// Get the partition device path for a given disk and partition number.
pub fn partition_path(disk: &Path, partition_num: u32) -> PathBuf {
    let disk_str = disk.display().to_string();

    // NVMe, mmcblk and loop devices use a 'p' separator (/dev/nvme0n1p1)
    if disk_str.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", disk_str, partition_num))
    } else {
        PathBuf::from(format!("{}{}", disk_str, partition_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FixedMemory;
    use crate::testing::ScriptedRunner;

    const DISK: &str = "/dev/sdx";

    fn check(runner: &ScriptedRunner, ram: Option<u64>, swap: SwapPolicy) -> DiskCheck {
        let memory = FixedMemory(ram);
        DiskPlanner::new(runner, &memory)
            .validate(Path::new(DISK), swap)
            .expect("lsblk is scripted") // test: known-good input
    }

    #[test]
    fn test_resolve_swap_policies() {
        assert_eq!(resolve_swap_gb(SwapPolicy::None, Some(16)), 0);
        assert_eq!(resolve_swap_gb(SwapPolicy::Fixed(4), Some(16)), 4);
        assert_eq!(resolve_swap_gb(SwapPolicy::Auto, Some(4)), 4);
        assert_eq!(resolve_swap_gb(SwapPolicy::Auto, Some(32)), 8);
        assert_eq!(resolve_swap_gb(SwapPolicy::Auto, None), 2);
    }

    #[test]
    fn test_suitable_disk_plan() {
        let runner = ScriptedRunner::new().with_disk(DISK, 25, false);
        let check = check(&runner, Some(4), SwapPolicy::Auto);
        let plan = check.plan().expect("25GB with 4GB swap fits"); // test: known-good input

        assert_eq!(plan.size_gb, 25);
        assert_eq!(plan.swap_gb, 4);
        assert_eq!(plan.required_gb, 20);
        assert_eq!(plan.model, "Test Disk");
        assert_eq!(plan.boot, ByteRange { start: MIB, end: 513 * MIB });
        assert_eq!(plan.root.start, 513 * MIB);
        assert_eq!(plan.root.end, 25 * GIB - MIB);
        assert_eq!(check.to_string(), "Disk suitable: 25GB total, 5GB will remain free");
    }

    #[test]
    fn test_small_disk_rejected() {
        let runner = ScriptedRunner::new().with_disk(DISK, 19, false);
        let check = check(&runner, Some(4), SwapPolicy::None);
        assert_eq!(
            check.rejection(),
            Some(&DiskRejection::TooSmall { size_gb: 19 })
        );
        assert!(check.to_string().contains("too small"));
        // Size is checked before mounts
        assert_eq!(runner.calls_to("lsblk").len(), 1);
    }

    #[test]
    fn test_mounted_disk_rejected() {
        let runner = ScriptedRunner::new().with_disk(DISK, 100, true);
        let check = check(&runner, Some(4), SwapPolicy::Auto);
        assert_eq!(check.rejection(), Some(&DiskRejection::Mounted));
    }

    #[test]
    fn test_insufficient_space_names_shortfall() {
        let runner = ScriptedRunner::new().with_disk(DISK, 20, false);
        let check = check(&runner, None, SwapPolicy::Fixed(8));
        assert_eq!(
            check.rejection(),
            Some(&DiskRejection::InsufficientSpace {
                available_gb: 20,
                required_gb: 24,
                swap_gb: 8,
                shortfall_gb: 4,
            })
        );
        assert!(check.to_string().contains("4GB short"));
    }

    #[test]
    fn test_huge_fixed_swap_is_insufficient_space() {
        let runner = ScriptedRunner::new().with_disk(DISK, 25, false);
        let swap: SwapPolicy = "18446744073709551615G".parse().unwrap();
        let check = check(&runner, Some(4), swap);
        assert!(matches!(
            check.rejection(),
            Some(DiskRejection::InsufficientSpace { available_gb: 25, required_gb, .. })
                if *required_gb == u64::MAX
        ));
        assert_eq!(required_space_gb(u64::MAX), None);
        assert_eq!(required_space_gb(4), Some(20));
    }

    #[test]
    fn test_unqueryable_disk() {
        let runner = ScriptedRunner::new().fail_when(
            "lsblk",
            DISK,
            32,
            "lsblk: /dev/sdx: not a block device",
        );
        let check = check(&runner, Some(4), SwapPolicy::Auto);
        assert!(matches!(
            check.rejection(),
            Some(DiskRejection::NotQueryable { reason }) if reason.contains("not a block device")
        ));
    }

    #[test]
    fn test_missing_lsblk_is_an_error() {
        let runner = ScriptedRunner::new().missing_binary("lsblk");
        let memory = FixedMemory(Some(4));
        let err = DiskPlanner::new(&runner, &memory)
            .validate(Path::new(DISK), SwapPolicy::Auto)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Disk);
    }

    #[test]
    fn test_plan_applies_filesystem_and_tags_rejections() {
        let runner = ScriptedRunner::new().with_disk(DISK, 10, false);
        let memory = FixedMemory(Some(4));
        let mut config = InstallConfig {
            device: DISK.to_string(),
            ..InstallConfig::default()
        };
        let err = DiskPlanner::new(&runner, &memory).plan(&config).unwrap_err();
        assert_eq!(err.stage, Stage::Disk);
        assert!(err.to_string().contains("Disk too small: 10GB"));

        let runner = ScriptedRunner::new().with_disk(DISK, 64, false);
        config.filesystem = Filesystem::Btrfs;
        let plan = DiskPlanner::new(&runner, &memory).plan(&config).unwrap();
        assert_eq!(plan.filesystem, Filesystem::Btrfs);
    }

    #[test]
    fn test_validation_never_runs_destructive_tools() {
        let runner = ScriptedRunner::new().with_disk(DISK, 25, false);
        check(&runner, Some(4), SwapPolicy::Auto);
        assert!(runner.calls().iter().all(|c| !c.destructive));
    }

    #[test]
    fn test_parse_size_model() {
        assert_eq!(
            parse_size_model("500107862016 Samsung SSD 860\n"),
            Some((500107862016, "Samsung SSD 860".to_string()))
        );
        assert_eq!(
            parse_size_model("21474836480\n"),
            Some((21474836480, "Unknown".to_string()))
        );
        assert_eq!(parse_size_model(""), None);
        assert_eq!(parse_size_model("abc"), None);
    }

    #[test]
    fn test_partition_path_sda() {
        assert_eq!(partition_path(Path::new("/dev/sda"), 1), PathBuf::from("/dev/sda1"));
        assert_eq!(partition_path(Path::new("/dev/sda"), 2), PathBuf::from("/dev/sda2"));
    }

    #[test]
    fn test_partition_path_nvme() {
        assert_eq!(
            partition_path(Path::new("/dev/nvme0n1"), 1),
            PathBuf::from("/dev/nvme0n1p1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/mmcblk0"), 2),
            PathBuf::from("/dev/mmcblk0p2")
        );
    }

    #[test]
    fn test_plan_summary_mentions_partitions() {
        let runner = ScriptedRunner::new().with_disk("/dev/nvme0n1", 50, false);
        let memory = FixedMemory(Some(16));
        let plan = DiskPlanner::new(&runner, &memory)
            .validate(Path::new("/dev/nvme0n1"), SwapPolicy::Auto)
            .unwrap();
        let summary = plan.plan().unwrap().summary();
        assert!(summary.contains("/dev/nvme0n1p1 FAT32, 512MiB"));
        assert!(summary.contains("Swap file: 8GB"));
    }
}
