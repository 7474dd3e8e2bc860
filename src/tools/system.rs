//! Bootstrap and chroot tools: pacstrap, genfstab, arch-chroot and the
//! commands run inside the target root.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ToolArgs, path_arg};
use crate::types::Kernel;

/// pacstrap gives no granular feedback and is network-bound.
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Packages every installation gets, before the kernel and caller extras.
pub const BASE_PACKAGES: &[&str] = &["base", "base-devel"];

/// Packages installed after the kernel and its headers.
pub const SYSTEM_PACKAGES: &[&str] = &[
    "linux-firmware",
    "networkmanager",
    "grub",
    "efibootmgr",
    "nano",
    "vim",
    "git",
    "wget",
    "curl",
];

/// `pacstrap <root> <packages...>`.
#[derive(Debug, Clone)]
pub struct Pacstrap {
    pub root: PathBuf,
    pub packages: Vec<String>,
}

impl Pacstrap {
    /// Base set for `kernel` followed by `extras`, without duplicates.
    pub fn base_system(root: impl Into<PathBuf>, kernel: Kernel, extras: &[String]) -> Self {
        let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();
        packages.push(kernel.to_string());
        packages.push(kernel.headers());
        packages.extend(SYSTEM_PACKAGES.iter().map(|p| p.to_string()));
        for extra in extras {
            if !packages.contains(extra) {
                packages.push(extra.clone());
            }
        }
        Self {
            root: root.into(),
            packages,
        }
    }
}

impl ToolArgs for Pacstrap {
    fn program(&self) -> &'static str {
        "pacstrap"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![path_arg(&self.root)];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn timeout(&self) -> Option<Duration> {
        Some(BOOTSTRAP_TIMEOUT)
    }
}

/// `genfstab -U <root>`: fstab entries keyed by UUID, on stdout.
#[derive(Debug, Clone)]
pub struct Genfstab {
    pub root: PathBuf,
}

impl ToolArgs for Genfstab {
    fn program(&self) -> &'static str {
        "genfstab"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-U".to_string(), path_arg(&self.root)]
    }
}

/// Runs `tool` inside the target root via `arch-chroot`.
pub struct InChroot<'a> {
    pub root: &'a Path,
    pub tool: &'a dyn ToolArgs,
}

impl<'a> InChroot<'a> {
    pub fn new(root: &'a Path, tool: &'a dyn ToolArgs) -> Self {
        Self { root, tool }
    }
}

impl ToolArgs for InChroot<'_> {
    fn program(&self) -> &'static str {
        "arch-chroot"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![path_arg(self.root), self.tool.program().to_string()];
        args.extend(self.tool.to_cli_args());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        self.tool.get_env_vars()
    }

    fn stdin(&self) -> Option<String> {
        self.tool.stdin()
    }

    fn timeout(&self) -> Option<Duration> {
        self.tool.timeout()
    }

    fn is_destructive(&self) -> bool {
        self.tool.is_destructive()
    }
}

/// `locale-gen`.
#[derive(Debug, Clone, Copy)]
pub struct LocaleGen;

impl ToolArgs for LocaleGen {
    fn program(&self) -> &'static str {
        "locale-gen"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// `ln -sf /usr/share/zoneinfo/<tz> /etc/localtime`.
#[derive(Debug, Clone)]
pub struct LinkTimezone {
    pub timezone: String,
}

impl ToolArgs for LinkTimezone {
    fn program(&self) -> &'static str {
        "ln"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-sf".to_string(),
            format!("/usr/share/zoneinfo/{}", self.timezone),
            "/etc/localtime".to_string(),
        ]
    }
}

/// `hwclock --systohc`.
#[derive(Debug, Clone, Copy)]
pub struct Hwclock;

impl ToolArgs for Hwclock {
    fn program(&self) -> &'static str {
        "hwclock"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--systohc".to_string()]
    }
}

/// Supplementary groups for the primary user.
pub const USER_GROUPS: &str = "wheel,audio,video,optical,storage";

/// `useradd -m -G <groups> <username>`.
#[derive(Debug, Clone)]
pub struct UserAdd {
    pub username: String,
}

impl ToolArgs for UserAdd {
    fn program(&self) -> &'static str {
        "useradd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            "-G".to_string(),
            USER_GROUPS.to_string(),
            self.username.clone(),
        ]
    }
}

/// `chpasswd` fed `<user>:<password>` on stdin.
#[derive(Clone)]
pub struct Chpasswd {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Chpasswd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chpasswd")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ToolArgs for Chpasswd {
    fn program(&self) -> &'static str {
        "chpasswd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }

    fn stdin(&self) -> Option<String> {
        Some(format!("{}:{}", self.username, self.password))
    }
}

/// `systemctl enable <units...>`.
#[derive(Debug, Clone)]
pub struct SystemctlEnable {
    pub units: Vec<String>,
}

impl ToolArgs for SystemctlEnable {
    fn program(&self) -> &'static str {
        "systemctl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["enable".to_string()];
        args.extend(self.units.iter().cloned());
        args
    }
}

/// `grub-install` for a removable x86_64 EFI install under `/boot/efi`.
#[derive(Debug, Clone, Copy)]
pub struct GrubInstall;

impl ToolArgs for GrubInstall {
    fn program(&self) -> &'static str {
        "grub-install"
    }

    fn to_cli_args(&self) -> Vec<String> {
        [
            "--target=x86_64-efi",
            "--efi-directory=/boot/efi",
            "--bootloader-id=GRUB",
            "--removable",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// `grub-mkconfig -o /boot/grub/grub.cfg`.
#[derive(Debug, Clone, Copy)]
pub struct GrubMkconfig;

impl ToolArgs for GrubMkconfig {
    fn program(&self) -> &'static str {
        "grub-mkconfig"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-o".to_string(), "/boot/grub/grub.cfg".to_string()]
    }
}

/// `pacman -Sy`.
#[derive(Debug, Clone, Copy)]
pub struct PacmanRefresh;

impl ToolArgs for PacmanRefresh {
    fn program(&self) -> &'static str {
        "pacman"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-Sy".to_string()]
    }
}

/// `pacman -S --needed --noconfirm <packages...>`.
#[derive(Debug, Clone)]
pub struct PacmanInstall {
    pub packages: Vec<String>,
}

impl ToolArgs for PacmanInstall {
    fn program(&self) -> &'static str {
        "pacman"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            "--needed".to_string(),
            "--noconfirm".to_string(),
        ];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn timeout(&self) -> Option<Duration> {
        Some(BOOTSTRAP_TIMEOUT)
    }
}

/// `sync`.
#[derive(Debug, Clone, Copy)]
pub struct SyncDisks;

impl ToolArgs for SyncDisks {
    fn program(&self) -> &'static str {
        "sync"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// `arch-chroot <root> <script>` with extra environment.
#[derive(Debug, Clone)]
pub struct ChrootScript {
    pub root: PathBuf,
    /// Path inside the target root.
    pub script: String,
    pub env: Vec<(String, String)>,
}

impl ToolArgs for ChrootScript {
    fn program(&self) -> &'static str {
        "arch-chroot"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![path_arg(&self.root), self.script.clone()]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        self.env.clone()
    }
}

/// `arch-chroot <root> su - <user> -c <command>`.
#[derive(Debug, Clone)]
pub struct RunAsUser {
    pub root: PathBuf,
    pub username: String,
    pub command: String,
}

impl ToolArgs for RunAsUser {
    fn program(&self) -> &'static str {
        "arch-chroot"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            path_arg(&self.root),
            "su".to_string(),
            "-".to_string(),
            self.username.clone(),
            "-c".to_string(),
            self.command.clone(),
        ]
    }
}
