//! Type-safe configuration types for the installer
//!
//! Filesystem, kernel and swap choices are enums rather than strings so a
//! typo in a configuration file is rejected at load time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Filesystem type for partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Filesystem {
    #[default]
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    /// FAT32, used for the EFI system partition only
    Fat32,
}

impl Filesystem {
    /// Whether this filesystem may hold the root partition.
    pub const fn is_root_capable(self) -> bool {
        !matches!(self, Self::Fat32)
    }
}

/// Linux kernel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Kernel {
    #[default]
    #[serde(rename = "linux")]
    #[strum(serialize = "linux")]
    Linux,
    #[serde(rename = "linux-lts")]
    #[strum(serialize = "linux-lts")]
    LinuxLts,
    #[serde(rename = "linux-zen")]
    #[strum(serialize = "linux-zen")]
    LinuxZen,
    #[serde(rename = "linux-hardened")]
    #[strum(serialize = "linux-hardened")]
    LinuxHardened,
}

impl Kernel {
    /// Package name of the matching headers.
    pub fn headers(self) -> String {
        format!("{}-headers", self)
    }
}

/// How much swap to allocate on the target.
///
/// String forms: `none`, `auto`, `<N>G` and `<N>M`. Megabyte sizes are
/// converted to whole gigabytes when parsed (floor-divided by 1024, at
/// least 1 when non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SwapPolicy {
    None,
    #[default]
    Auto,
    /// A fixed size in whole gigabytes.
    Fixed(u64),
}

/// Error for unparseable swap policy strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid swap size '{0}'. Valid: none, auto, <N>G, <N>M")]
pub struct SwapPolicyError(pub String);

impl FromStr for SwapPolicy {
    type Err = SwapPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "none" | "0" => return Ok(SwapPolicy::None),
            "auto" => return Ok(SwapPolicy::Auto),
            _ => {}
        }

        let upper = trimmed.to_uppercase();
        let upper = upper.strip_suffix('B').unwrap_or(&upper);
        let invalid = || SwapPolicyError(s.to_string());

        if let Some(num) = upper.strip_suffix('G') {
            let gb: u64 = num.parse().map_err(|_| invalid())?;
            Ok(SwapPolicy::Fixed(gb))
        } else if let Some(num) = upper.strip_suffix('M') {
            let mb: u64 = num.parse().map_err(|_| invalid())?;
            let gb = if mb == 0 { 0 } else { (mb / 1024).max(1) };
            Ok(SwapPolicy::Fixed(gb))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for SwapPolicy {
    type Error = SwapPolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SwapPolicy> for String {
    fn from(policy: SwapPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for SwapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapPolicy::None => write!(f, "none"),
            SwapPolicy::Auto => write!(f, "auto"),
            SwapPolicy::Fixed(gb) => write!(f, "{}G", gb),
        }
    }
}
