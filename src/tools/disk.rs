//! Disk tools: lsblk, wipefs, sgdisk, partprobe, mkfs.*, mount, swap file.

use std::path::PathBuf;

use super::{ToolArgs, path_arg};
use crate::types::Filesystem;

/// Read-only block device queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lsblk {
    /// `SIZE MODEL` of the device itself, size in bytes.
    SizeModel(PathBuf),
    /// Mount points of the device and all of its partitions.
    Mountpoints(PathBuf),
    /// `PATH TYPE` for the device and its children.
    Children(PathBuf),
}

impl ToolArgs for Lsblk {
    fn program(&self) -> &'static str {
        "lsblk"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let (flags, columns, device): (&[&str], &str, _) = match self {
            Lsblk::SizeModel(d) => (&["-b", "-d", "-n"][..], "SIZE,MODEL", d),
            Lsblk::Mountpoints(d) => (&["-n"][..], "MOUNTPOINT", d),
            Lsblk::Children(d) => (&["-l", "-n"][..], "PATH,TYPE", d),
        };
        let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        args.push("-o".to_string());
        args.push(columns.to_string());
        args.push(path_arg(device));
        args
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

/// `wipefs -a <device>`: erase filesystem and partition-table signatures.
#[derive(Debug, Clone)]
pub struct Wipefs {
    pub device: PathBuf,
}

impl ToolArgs for Wipefs {
    fn program(&self) -> &'static str {
        "wipefs"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-a".to_string(), path_arg(&self.device)]
    }
}

/// `sgdisk -Z <device>`: destroy GPT and MBR structures.
#[derive(Debug, Clone)]
pub struct SgdiskZap {
    pub device: PathBuf,
}

impl ToolArgs for SgdiskZap {
    fn program(&self) -> &'static str {
        "sgdisk"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-Z".to_string(), path_arg(&self.device)]
    }
}

/// `sgdisk -n <num>:0:<end> -t <num>:<type> <device>`.
///
/// `end` is sgdisk syntax: `+512M` for a fixed size, `0` for the rest of
/// the disk.
#[derive(Debug, Clone)]
pub struct SgdiskNew {
    pub device: PathBuf,
    pub number: u32,
    pub end: String,
    pub type_code: &'static str,
}

impl ToolArgs for SgdiskNew {
    fn program(&self) -> &'static str {
        "sgdisk"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-n".to_string(),
            format!("{}:0:{}", self.number, self.end),
            "-t".to_string(),
            format!("{}:{}", self.number, self.type_code),
            path_arg(&self.device),
        ]
    }
}

/// `partprobe <device>`: ask the kernel to re-read the partition table.
#[derive(Debug, Clone)]
pub struct Partprobe {
    pub device: PathBuf,
}

impl ToolArgs for Partprobe {
    fn program(&self) -> &'static str {
        "partprobe"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![path_arg(&self.device)]
    }
}

/// Format a partition. Each filesystem has its own binary and force flag.
#[derive(Debug, Clone)]
pub struct Mkfs {
    pub partition: PathBuf,
    pub filesystem: Filesystem,
}

impl ToolArgs for Mkfs {
    fn program(&self) -> &'static str {
        match self.filesystem {
            Filesystem::Ext4 => "mkfs.ext4",
            Filesystem::Btrfs => "mkfs.btrfs",
            Filesystem::Xfs => "mkfs.xfs",
            Filesystem::F2fs => "mkfs.f2fs",
            Filesystem::Fat32 => "mkfs.fat",
        }
    }

    fn to_cli_args(&self) -> Vec<String> {
        let flag = match self.filesystem {
            Filesystem::Ext4 => "-F",
            Filesystem::Fat32 => "-F32",
            Filesystem::Btrfs | Filesystem::Xfs | Filesystem::F2fs => "-f",
        };
        vec![flag.to_string(), path_arg(&self.partition)]
    }
}

/// `mount <source> <target>`.
#[derive(Debug, Clone)]
pub struct Mount {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl ToolArgs for Mount {
    fn program(&self) -> &'static str {
        "mount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![path_arg(&self.source), path_arg(&self.target)]
    }
}

/// `umount [-l|-R] <target>`.
#[derive(Debug, Clone)]
pub struct Umount {
    pub target: PathBuf,
    pub mode: UmountMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmountMode {
    Normal,
    /// Detach now, clean up when no longer busy.
    Lazy,
    /// Everything mounted at or below the target, deepest first.
    Recursive,
}

impl Umount {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            mode: UmountMode::Normal,
        }
    }

    pub fn with_mode(mut self, mode: UmountMode) -> Self {
        self.mode = mode;
        self
    }
}

impl ToolArgs for Umount {
    fn program(&self) -> &'static str {
        "umount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        match self.mode {
            UmountMode::Normal => {}
            UmountMode::Lazy => args.push("-l".to_string()),
            UmountMode::Recursive => args.push("-R".to_string()),
        }
        args.push(path_arg(&self.target));
        args
    }
}

/// `fallocate -l <N>G <path>`.
#[derive(Debug, Clone)]
pub struct Fallocate {
    pub path: PathBuf,
    pub size_gb: u64,
}

impl ToolArgs for Fallocate {
    fn program(&self) -> &'static str {
        "fallocate"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-l".to_string(),
            format!("{}G", self.size_gb),
            path_arg(&self.path),
        ]
    }
}

/// `chmod <mode> <path>`.
#[derive(Debug, Clone)]
pub struct Chmod {
    pub mode: &'static str,
    pub path: PathBuf,
}

impl ToolArgs for Chmod {
    fn program(&self) -> &'static str {
        "chmod"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.mode.to_string(), path_arg(&self.path)]
    }
}

/// `mkswap <path>`. The swap area is initialized, not activated.
#[derive(Debug, Clone)]
pub struct Mkswap {
    pub path: PathBuf,
}

impl ToolArgs for Mkswap {
    fn program(&self) -> &'static str {
        "mkswap"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![path_arg(&self.path)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsblk_queries_are_read_only() {
        let dev = PathBuf::from("/dev/sda");
        let q = Lsblk::SizeModel(dev.clone());
        assert_eq!(q.to_cli_args(), vec!["-b", "-d", "-n", "-o", "SIZE,MODEL", "/dev/sda"]);
        assert!(!q.to_spec().destructive);
        assert_eq!(
            Lsblk::Mountpoints(dev.clone()).to_cli_args(),
            vec!["-n", "-o", "MOUNTPOINT", "/dev/sda"]
        );
        assert_eq!(
            Lsblk::Children(dev).to_cli_args(),
            vec!["-l", "-n", "-o", "PATH,TYPE", "/dev/sda"]
        );
    }

    #[test]
    fn test_sgdisk_partition_args() {
        let efi = SgdiskNew {
            device: PathBuf::from("/dev/nvme0n1"),
            number: 1,
            end: "+512M".to_string(),
            type_code: "ef00",
        };
        assert_eq!(
            efi.to_spec().command_line(),
            "sgdisk -n 1:0:+512M -t 1:ef00 /dev/nvme0n1"
        );
    }

    #[test]
    fn test_mkfs_program_and_flag_per_filesystem() {
        let cases = [
            (Filesystem::Ext4, "mkfs.ext4 -F /dev/sda2"),
            (Filesystem::Btrfs, "mkfs.btrfs -f /dev/sda2"),
            (Filesystem::Xfs, "mkfs.xfs -f /dev/sda2"),
            (Filesystem::F2fs, "mkfs.f2fs -f /dev/sda2"),
            (Filesystem::Fat32, "mkfs.fat -F32 /dev/sda2"),
        ];
        for (filesystem, expected) in cases {
            let mkfs = Mkfs {
                partition: PathBuf::from("/dev/sda2"),
                filesystem,
            };
            assert_eq!(mkfs.to_spec().command_line(), expected);
        }
    }

    #[test]
    fn test_umount_modes() {
        assert_eq!(Umount::new("/mnt").to_cli_args(), vec!["/mnt"]);
        assert_eq!(
            Umount::new("/dev/sda1").with_mode(UmountMode::Lazy).to_cli_args(),
            vec!["-l", "/dev/sda1"]
        );
        assert_eq!(
            Umount::new("/mnt").with_mode(UmountMode::Recursive).to_cli_args(),
            vec!["-R", "/mnt"]
        );
    }

    #[test]
    fn test_swapfile_tools() {
        let path = PathBuf::from("/mnt/swapfile");
        assert_eq!(
            Fallocate { path: path.clone(), size_gb: 4 }.to_spec().command_line(),
            "fallocate -l 4G /mnt/swapfile"
        );
        assert_eq!(
            Chmod { mode: "600", path: path.clone() }.to_spec().command_line(),
            "chmod 600 /mnt/swapfile"
        );
        assert_eq!(Mkswap { path }.to_cli_args(), vec!["/mnt/swapfile"]);
    }
}
