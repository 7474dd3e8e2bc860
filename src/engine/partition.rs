//! Disk execution: turns a [`DiskPlan`] into a partitioned, formatted and
//! mounted target.
//!
//! Sequence:
//!
//! ```text
//! umount existing partitions (best effort, retried lazily)
//! wipefs -a → sgdisk -Z → sgdisk EF00 512M → sgdisk 8300 rest → partprobe
//! mkfs.fat -F32 boot → mkfs.<fs> root
//! mount root <mnt> → mount boot <mnt>/boot/efi
//! fallocate → chmod 600 → mkswap    (swap > 0 only, never activated)
//! ```
//!
//! On any failure the mounts made so far are undone, boot before root,
//! before the error is returned.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::storage::DiskPlan;
use crate::command_runner::{CommandRunner, StageRunner};
use crate::error::{InstallationError, Result, Stage};
use crate::paths::InstallPaths;
use crate::tools::disk::{
    Chmod, Fallocate, Lsblk, Mkfs, Mkswap, Mount, Partprobe, SgdiskNew, SgdiskZap, Umount,
    UmountMode, Wipefs,
};
use crate::types::Filesystem;

/// GPT type code of the EFI System Partition.
pub const EFI_TYPE_CODE: &str = "ef00";
/// GPT type code of a Linux filesystem partition.
pub const LINUX_TYPE_CODE: &str = "8300";

/// What the executor left behind on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResult {
    pub device: PathBuf,
    pub boot_partition: PathBuf,
    pub root_partition: PathBuf,
    pub filesystem: Filesystem,
    pub mount_point: PathBuf,
    pub boot_mount: PathBuf,
    /// Initialized but inactive swap file, when swap was requested.
    pub swap_file: Option<PathBuf>,
    pub swap_gb: u64,
}

#[derive(Debug, Default)]
struct Mounted {
    root: Option<PathBuf>,
    boot: Option<PathBuf>,
}

pub struct DiskExecutor<'a> {
    runner: StageRunner<'a>,
    paths: &'a InstallPaths,
}

impl<'a> DiskExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a InstallPaths) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Disk),
            paths,
        }
    }

    /// Partition, format and mount the plan's device.
    ///
    /// # Errors
    ///
    /// A Disk-stage error naming the failed tool. Anything mounted by this
    /// call has been unmounted again by the time it returns.
    pub fn apply(&self, plan: &DiskPlan) -> Result<PartitionResult> {
        if !plan.filesystem.is_root_capable() {
            return Err(InstallationError::invalid(
                Stage::Disk,
                format!("Unsupported root filesystem: {}", plan.filesystem),
            ));
        }

        info!("Partitioning {} with {} root", plan.device.display(), plan.filesystem);
        let mut mounted = Mounted::default();
        match self.execute(plan, &mut mounted) {
            Ok(result) => {
                info!("Partitioning of {} completed", plan.device.display());
                Ok(result)
            }
            Err(e) => {
                warn!("Partitioning failed, releasing mounts: {}", e);
                self.release(&mounted);
                Err(e)
            }
        }
    }

    fn execute(&self, plan: &DiskPlan, mounted: &mut Mounted) -> Result<PartitionResult> {
        let device = plan.device.clone();
        self.unmount_existing(&device);

        info!("Wiping {}", device.display());
        self.runner.run(&Wipefs { device: device.clone() })?;
        self.runner.run(&SgdiskZap { device: device.clone() })?;

        info!("Creating partitions");
        self.runner.run(&SgdiskNew {
            device: device.clone(),
            number: 1,
            end: format!("+{}M", super::storage::BOOT_PARTITION_MIB),
            type_code: EFI_TYPE_CODE,
        })?;
        self.runner.run(&SgdiskNew {
            device: device.clone(),
            number: 2,
            end: "0".to_string(),
            type_code: LINUX_TYPE_CODE,
        })?;
        self.runner.run(&Partprobe { device: device.clone() })?;

        let boot_partition = plan.boot_partition();
        let root_partition = plan.root_partition();

        info!("Formatting partitions");
        self.runner.run(&Mkfs {
            partition: boot_partition.clone(),
            filesystem: Filesystem::Fat32,
        })?;
        self.runner.run(&Mkfs {
            partition: root_partition.clone(),
            filesystem: plan.filesystem,
        })?;

        info!("Mounting partitions");
        let mount_point = self.paths.mount_point.clone();
        create_dir(&mount_point)?;
        self.runner.run(&Mount {
            source: root_partition.clone(),
            target: mount_point.clone(),
        })?;
        mounted.root = Some(mount_point.clone());

        let boot_mount = self.paths.boot_mount();
        create_dir(&boot_mount)?;
        self.runner.run(&Mount {
            source: boot_partition.clone(),
            target: boot_mount.clone(),
        })?;
        mounted.boot = Some(boot_mount.clone());

        let swap_file = if plan.swap_gb > 0 {
            Some(self.create_swap_file(plan.swap_gb)?)
        } else {
            info!("No swap requested");
            None
        };

        Ok(PartitionResult {
            device,
            boot_partition,
            root_partition,
            filesystem: plan.filesystem,
            mount_point,
            boot_mount,
            swap_file,
            swap_gb: plan.swap_gb,
        })
    }

    /// Unmount every partition of `device`. Failures are logged only.
    fn unmount_existing(&self, device: &Path) {
        let listing = match self.runner.query(&Lsblk::Children(device.to_path_buf())) {
            Ok(output) if output.is_success() => output.stdout,
            Ok(output) => {
                warn!(
                    "Could not list partitions of {}: {}",
                    device.display(),
                    output.stderr.trim()
                );
                return;
            }
            Err(e) => {
                warn!("Could not list partitions of {}: {}", device.display(), e);
                return;
            }
        };

        for partition in parse_partitions(&listing) {
            if !self.runner.run_best_effort(&Umount::new(&partition)) {
                self.runner
                    .run_best_effort(&Umount::new(&partition).with_mode(UmountMode::Lazy));
            }
        }
    }

    fn create_swap_file(&self, size_gb: u64) -> Result<PathBuf> {
        let path = self.paths.swap_file();
        info!("Creating {}G swap file", size_gb);
        self.runner.run(&Fallocate {
            path: path.clone(),
            size_gb,
        })?;
        self.runner.run(&Chmod {
            mode: "600",
            path: path.clone(),
        })?;
        self.runner.run(&Mkswap { path: path.clone() })?;
        Ok(path)
    }

    /// Boot lives beneath root, so it must go first.
    fn release(&self, mounted: &Mounted) {
        if let Some(boot) = &mounted.boot {
            self.runner.run_best_effort(&Umount::new(boot));
        }
        if let Some(root) = &mounted.root {
            self.runner.run_best_effort(&Umount::new(root));
        }
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        InstallationError::io(Stage::Disk, format!("creating {}", path.display()), e)
    })
}

/// Paths of `part` rows in `lsblk -l -n -o PATH,TYPE` output.
fn parse_partitions(listing: &str) -> Vec<PathBuf> {
    listing
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            match (cols.next(), cols.next()) {
                (Some(path), Some("part")) => Some(PathBuf::from(path)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::CommandOutput;
    use crate::engine::storage::ByteRange;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;

    fn plan(device: &str, filesystem: Filesystem, swap_gb: u64) -> DiskPlan {
        DiskPlan {
            device: PathBuf::from(device),
            model: "Test Disk".to_string(),
            size_bytes: 25 * 1024 * 1024 * 1024,
            size_gb: 25,
            swap_gb,
            required_gb: 16 + swap_gb,
            boot: ByteRange { start: 1 << 20, end: 513 << 20 },
            root: ByteRange { start: 513 << 20, end: (25 << 30) - (1 << 20) },
            filesystem,
        }
    }

    fn with_partitions(runner: ScriptedRunner, device: &str) -> ScriptedRunner {
        let listing = format!("{d} disk\n{d}1 part\n{d}2 part\n", d = device);
        runner.respond(
            |spec| spec.program == "lsblk" && spec.args.iter().any(|a| a == "PATH,TYPE"),
            CommandOutput::success(listing),
        )
    }

    #[test]
    fn test_apply_runs_tools_in_order() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = with_partitions(ScriptedRunner::new(), "/dev/sdx");

        let result = DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Ext4, 4))
            .unwrap();

        let mnt = paths.mount_point.display().to_string();
        let expected = vec![
            "lsblk -l -n -o PATH,TYPE /dev/sdx".to_string(),
            "umount /dev/sdx1".to_string(),
            "umount /dev/sdx2".to_string(),
            "wipefs -a /dev/sdx".to_string(),
            "sgdisk -Z /dev/sdx".to_string(),
            "sgdisk -n 1:0:+512M -t 1:ef00 /dev/sdx".to_string(),
            "sgdisk -n 2:0:0 -t 2:8300 /dev/sdx".to_string(),
            "partprobe /dev/sdx".to_string(),
            "mkfs.fat -F32 /dev/sdx1".to_string(),
            "mkfs.ext4 -F /dev/sdx2".to_string(),
            format!("mount /dev/sdx2 {}", mnt),
            format!("mount /dev/sdx1 {}/boot/efi", mnt),
            format!("fallocate -l 4G {}/swapfile", mnt),
            format!("chmod 600 {}/swapfile", mnt),
            format!("mkswap {}/swapfile", mnt),
        ];
        assert_eq!(runner.command_lines(), expected);
        assert_eq!(result.swap_file, Some(paths.swap_file()));
        assert!(paths.boot_mount().is_dir());
        assert!(!runner.invoked("swapon"));
    }

    #[test]
    fn test_nvme_partition_names() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        let result = DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/nvme0n1", Filesystem::Btrfs, 0))
            .unwrap();
        assert_eq!(result.boot_partition, PathBuf::from("/dev/nvme0n1p1"));
        assert_eq!(result.root_partition, PathBuf::from("/dev/nvme0n1p2"));
        assert!(runner.position("mkfs.btrfs -f /dev/nvme0n1p2").is_some());
        assert!(result.swap_file.is_none());
        assert!(!runner.invoked("fallocate"));
    }

    #[test]
    fn test_busy_partition_retried_lazily() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = with_partitions(ScriptedRunner::new(), "/dev/sdx")
            .fail_when("umount", "/dev/sdx1", 32, "target is busy");
        let busy = runner.respond(
            |spec| spec.program == "umount" && spec.args.first().is_some_and(|a| a == "-l"),
            CommandOutput::success(""),
        );

        DiskExecutor::new(&busy, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Ext4, 0))
            .unwrap();
        assert!(busy.position("umount -l /dev/sdx1").is_some());
        assert!(busy.position("umount -l /dev/sdx2").is_none());
    }

    #[test]
    fn test_root_only_filesystems_rejected_before_any_tool() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        let err = DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Fat32, 0))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Disk);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_format_failure_leaves_nothing_to_unmount() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().fail_when("mkfs.ext4", "", 1, "device busy");
        let err = DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Ext4, 2))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Disk);
        assert!(err.to_string().contains("device busy"));
        assert!(!runner.invoked("mount"));
        let mnt = paths.mount_point.display().to_string();
        assert!(runner.position(&format!("umount {}", mnt)).is_none());
    }

    #[test]
    fn test_boot_mount_failure_unmounts_root() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().fail_when("mount", "boot/efi", 32, "mount failed");
        DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Ext4, 2))
            .unwrap_err();

        let mnt = paths.mount_point.display().to_string();
        let umounts: Vec<String> = runner
            .calls_to("umount")
            .iter()
            .map(|c| c.command_line())
            .collect();
        assert_eq!(umounts, vec![format!("umount {}", mnt)]);
    }

    #[test]
    fn test_swap_failure_unmounts_boot_before_root() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().fail_when("mkswap", "", 1, "mkswap: error");
        let err = DiskExecutor::new(&runner, &paths)
            .apply(&plan("/dev/sdx", Filesystem::Xfs, 4))
            .unwrap_err();
        assert!(err.to_string().contains("mkswap"));

        let mnt = paths.mount_point.display().to_string();
        let boot = runner.position(&format!("umount {}/boot/efi", mnt)).unwrap();
        let root = runner
            .command_lines()
            .iter()
            .position(|l| *l == format!("umount {}", mnt))
            .unwrap();
        assert!(boot < root);
    }

    #[test]
    fn test_parse_partitions() {
        let listing = "/dev/sda disk\n/dev/sda1 part\n/dev/sda2 part\n/dev/sr0 rom\n\n";
        assert_eq!(
            parse_partitions(listing),
            vec![PathBuf::from("/dev/sda1"), PathBuf::from("/dev/sda2")]
        );
    }
}
