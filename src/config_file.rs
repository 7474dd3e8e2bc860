//! Installation configuration: the record a caller submits to the pipeline.
//!
//! The caller (or the `install --config` CLI path) assembles and validates
//! an [`InstallConfig`] before invoking the installer; the installer calls
//! [`InstallConfig::validate`] again before touching any disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::types::{Filesystem, Kernel, SwapPolicy};

/// Accounts that already exist on every Arch system.
const RESERVED_USERNAMES: &[&str] = &[
    "root", "bin", "daemon", "sys", "sync", "games", "man", "lp", "mail", "news", "uucp",
    "proxy", "www-data", "backup", "list", "irc", "gnats", "nobody",
];

const MAX_ADDITIONAL_PACKAGES: usize = 50;

/// Largest fixed swap file accepted.
pub const MAX_SWAP_GB: u64 = 16;

fn default_locale() -> String {
    "en_US.UTF-8".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn enabled() -> bool {
    true
}

/// Installation configuration that can be saved/loaded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Target block device, e.g. `/dev/sda` or `/dev/nvme0n1`
    pub device: String,
    #[serde(default)]
    pub filesystem: Filesystem,
    #[serde(default)]
    pub swap: SwapPolicy,

    pub hostname: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub root_password: Option<String>,
    /// Grant the user sudo through `/etc/sudoers.d/<user>`
    #[serde(default = "enabled")]
    pub sudo: bool,

    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub kernel: Kernel,

    /// Mirror URL template (`.../$repo/os/$arch`); `None` keeps the host list
    #[serde(default)]
    pub mirror_url: Option<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub additional_packages: Vec<String>,

    /// Build the yay AUR helper as the user
    #[serde(default = "enabled")]
    pub aur_helper: bool,
    /// Apply the HyDE overlay when the Hyprland profile is selected
    #[serde(default = "enabled")]
    pub theme_overlay: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            filesystem: Filesystem::default(),
            swap: SwapPolicy::default(),
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            root_password: None,
            sudo: true,
            locale: default_locale(),
            timezone: default_timezone(),
            kernel: Kernel::default(),
            mirror_url: None,
            profiles: Vec::new(),
            additional_packages: Vec::new(),
            aur_helper: true,
            theme_overlay: true,
        }
    }
}

impl fmt::Debug for InstallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallConfig")
            .field("device", &self.device)
            .field("filesystem", &self.filesystem)
            .field("swap", &self.swap)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("root_password", &self.root_password.as_ref().map(|_| "<redacted>"))
            .field("sudo", &self.sudo)
            .field("locale", &self.locale)
            .field("timezone", &self.timezone)
            .field("kernel", &self.kernel)
            .field("mirror_url", &self.mirror_url)
            .field("profiles", &self.profiles)
            .field("additional_packages", &self.additional_packages)
            .field("aur_helper", &self.aur_helper)
            .field("theme_overlay", &self.theme_overlay)
            .finish()
    }
}

impl InstallConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate every field. The first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        let device = self.device.trim();
        if device.is_empty() {
            anyhow::bail!("Target device must be specified");
        }
        if !device.starts_with('/') {
            anyhow::bail!("Target device must be an absolute path like /dev/sda");
        }

        if !self.filesystem.is_root_capable() {
            anyhow::bail!("{} cannot be used for the root partition", self.filesystem);
        }

        if let SwapPolicy::Fixed(gb) = self.swap {
            if gb > MAX_SWAP_GB {
                anyhow::bail!("Swap size too large: {}GB (maximum {}GB)", gb, MAX_SWAP_GB);
            }
        }

        validate_hostname(&self.hostname)?;
        validate_username(&self.username)?;
        validate_password("Password", &self.password)?;
        if let Some(root_password) = &self.root_password {
            validate_password("Root password", root_password)?;
        }

        if self.locale.trim().is_empty() {
            anyhow::bail!("Locale must be specified");
        }
        reject_control_chars("Locale", &self.locale)?;
        let timezone = self.timezone.trim();
        if timezone.is_empty() {
            anyhow::bail!("Timezone must be specified");
        }
        if timezone.contains("..") || timezone.starts_with('/') {
            anyhow::bail!("Invalid timezone '{}'", timezone);
        }

        reject_control_chars("Timezone", &self.timezone)?;

        if let Some(url) = &self.mirror_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("Mirror URL must start with http:// or https://");
            }
            reject_control_chars("Mirror URL", url)?;
        }

        if self.additional_packages.len() > MAX_ADDITIONAL_PACKAGES {
            anyhow::bail!(
                "Too many additional packages ({}, maximum {})",
                self.additional_packages.len(),
                MAX_ADDITIONAL_PACKAGES
            );
        }
        for package in &self.additional_packages {
            if !is_valid_package_name(package) {
                anyhow::bail!("Invalid package name: {}", package);
            }
        }

        for profile in &self.profiles {
            if profile.is_empty() || profile.contains('/') || profile.starts_with('.') {
                anyhow::bail!("Invalid profile name: '{}'", profile);
            }
        }

        Ok(())
    }
}

/// Values written into target config files must stay on one line.
fn reject_control_chars(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        anyhow::bail!("{} must not contain control characters", field);
    }
    Ok(())
}

/// 1-63 characters of letters, digits and hyphens, no leading or trailing hyphen.
fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        anyhow::bail!("Hostname cannot be empty");
    }
    if hostname.len() > 63 {
        anyhow::bail!("Hostname too long (max 63 characters)");
    }
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        anyhow::bail!("Invalid hostname format (use letters, numbers, hyphens only)");
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        anyhow::bail!("Hostname cannot start or end with hyphen");
    }
    Ok(())
}

/// `^[a-z_][a-z0-9_-]{0,31}$` and not a system account.
fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        anyhow::bail!("Username cannot be empty");
    };
    if username.len() > 32 {
        anyhow::bail!("Username too long (max 32 characters)");
    }
    let valid_first = first.is_ascii_lowercase() || first == '_';
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !(valid_first && valid_rest) {
        anyhow::bail!(
            "Invalid username (use lowercase letters, numbers, underscore, hyphen only)"
        );
    }
    if RESERVED_USERNAMES.contains(&username) {
        anyhow::bail!("Username '{}' conflicts with a system user", username);
    }
    Ok(())
}

fn validate_password(label: &str, password: &str) -> Result<()> {
    let length = password.chars().count();
    if length == 0 {
        anyhow::bail!("{} cannot be empty", label);
    }
    if length < 6 {
        anyhow::bail!("{} too short (minimum 6 characters)", label);
    }
    if length > 128 {
        anyhow::bail!("{} too long (maximum 128 characters)", label);
    }
    if !password.chars().any(char::is_alphabetic) {
        anyhow::bail!("{} must contain at least one letter", label);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        anyhow::bail!("{} must contain at least one number", label);
    }
    // chpasswd reads `user:password` lines
    if password.contains('\n') {
        anyhow::bail!("{} cannot contain a newline", label);
    }
    Ok(())
}

/// `^[a-z0-9][a-z0-9+._-]*$`
fn is_valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-')
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config() -> InstallConfig {
        InstallConfig {
            device: "/dev/sda".to_string(),
            hostname: "gx-test".to_string(),
            username: "gamer".to_string(),
            password: "validpass1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_install_config_default() {
        let config = InstallConfig::default();
        assert!(config.device.is_empty());
        assert_eq!(config.swap, SwapPolicy::Auto);
        assert_eq!(config.filesystem, Filesystem::Ext4);
        assert_eq!(config.locale, "en_US.UTF-8");
        assert_eq!(config.timezone, "UTC");
        assert!(config.sudo);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let mut config = create_test_config();
        config.swap = SwapPolicy::Fixed(4);
        config.profiles = vec!["KDE".to_string()];
        config.mirror_url = Some("https://mirrors.kernel.org/archlinux/$repo/os/$arch".to_string());

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();
        let loaded = InstallConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_minimal_json_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"{"device":"/dev/sdb","hostname":"box","username":"gamer","password":"abc123"}"#,
            )
            .unwrap();
        let loaded = InstallConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.swap, SwapPolicy::Auto);
        assert_eq!(loaded.kernel, Kernel::Linux);
        assert!(loaded.aur_helper);
        assert!(loaded.profiles.is_empty());
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_load_json_missing_required_field() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(br#"{"device":"/dev/sdb"}"#).unwrap();
        assert!(InstallConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_json_rejects_bad_swap() {
        let json = concat!(
            r#"{"device":"/dev/sdb","hostname":"box","username":"gamer","#,
            r#""password":"abc123","swap":"lots"}"#
        );
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        assert!(InstallConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(InstallConfig::load_from_file("/nonexistent/path.json").is_err());
    }

    #[test]
    fn test_validation_device() {
        let mut config = create_test_config();
        config.device = "  ".to_string();
        assert!(config.validate().is_err());
        config.device = "sda".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_fat32_root() {
        let mut config = create_test_config();
        config.filesystem = Filesystem::Fat32;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_hostname_rules() {
        let mut config = create_test_config();
        for bad in ["", "-box", "box-", "my_box", "my box", "a".repeat(64).as_str()] {
            config.hostname = bad.to_string();
            assert!(config.validate().is_err(), "hostname {:?} should fail", bad);
        }
        for good in ["a", "gx-test", "Box01", "a".repeat(63).as_str()] {
            config.hostname = good.to_string();
            assert!(config.validate().is_ok(), "hostname {:?} should pass", good);
        }
    }

    #[test]
    fn test_validation_username_rules() {
        let mut config = create_test_config();
        for bad in ["", "Gamer", "1gamer", "root", "nobody", "ga mer", "a".repeat(33).as_str()] {
            config.username = bad.to_string();
            assert!(config.validate().is_err(), "username {:?} should fail", bad);
        }
        for good in ["_svc", "gamer-2", "g"] {
            config.username = good.to_string();
            assert!(config.validate().is_ok(), "username {:?} should pass", good);
        }
    }

    #[test]
    fn test_validation_password_rules() {
        let mut config = create_test_config();
        for bad in ["", "ab1", "abcdefgh", "12345678", "abc\n123"] {
            config.password = bad.to_string();
            assert!(config.validate().is_err(), "password {:?} should fail", bad);
        }
        config.password = "validpass1".to_string();
        config.root_password = Some("short".to_string());
        assert!(config.validate().is_err());
        config.root_password = Some("rootpass9".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_packages_and_profiles() {
        let mut config = create_test_config();
        config.additional_packages = vec!["firefox".to_string(), "gtk3+extra".to_string()];
        assert!(config.validate().is_ok());

        config.additional_packages = vec!["Firefox".to_string()];
        assert!(config.validate().is_err());

        config.additional_packages = (0..51).map(|i| format!("pkg{}", i)).collect();
        assert!(config.validate().is_err());

        config.additional_packages.clear();
        config.profiles = vec!["../etc".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_mirror_url_scheme() {
        let mut config = create_test_config();
        config.mirror_url = Some("ftp://mirror/$repo".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_timezone_traversal() {
        let mut config = create_test_config();
        config.timezone = "../../etc/passwd".to_string();
        assert!(config.validate().is_err());
        config.timezone = "America/New_York".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_swap_upper_bound() {
        let mut config = create_test_config();
        config.swap = SwapPolicy::Fixed(MAX_SWAP_GB);
        assert!(config.validate().is_ok());

        config.swap = "18446744073709551615G".parse().unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Swap size too large"));
    }

    #[test]
    fn test_validation_rejects_line_injection() {
        let mut config = create_test_config();
        config.locale = "en_US.UTF-8\nLC_ALL=C".to_string();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.mirror_url = Some("https://mirror/$repo/os/$arch\nServer = http://evil".to_string());
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.timezone = "UTC\r".to_string();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.mirror_url = Some("https://geo.mirror.pkgbuild.com/$repo/os/$arch".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let mut config = create_test_config();
        config.root_password = Some("rootpass9".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("validpass1"));
        assert!(!debug.contains("rootpass9"));
        assert!(debug.contains("gamer"));
    }
}
