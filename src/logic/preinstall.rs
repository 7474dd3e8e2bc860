//! Pre-install summary
//!
//! Everything the user confirms before the destructive stages start: the
//! resolved configuration, the selected profiles with their package counts,
//! and a rough time estimate.

use std::fmt;
use std::path::Path;

use crate::config_file::InstallConfig;
use crate::profiles::{self, ProfileBundle};

/// Base system install, in seconds.
const BASE_ESTIMATE_SECS: u64 = 10 * 60;
const PER_PROFILE_SECS: u64 = 5 * 60;
const PER_PACKAGE_SECS: u64 = 30;

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: String,
    pub description: &'static str,
    /// `None` when the bundle is missing or invalid in the catalog.
    pub package_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub device: String,
    pub hostname: String,
    pub username: String,
    pub locale: String,
    pub timezone: String,
    pub kernel: String,
    pub filesystem: String,
    pub swap: String,
    pub profiles: Vec<ProfileSummary>,
    pub additional_packages: Vec<String>,
    pub estimated_time: String,
}

impl InstallSummary {
    /// Summarize `config`, reading bundle details from `catalog`.
    pub fn build(config: &InstallConfig, catalog: &Path) -> Self {
        let profiles = config
            .profiles
            .iter()
            .map(|name| ProfileSummary {
                name: name.clone(),
                description: profiles::description(name),
                package_count: ProfileBundle::load(&catalog.join(name))
                    .ok()
                    .map(|b| b.packages.len()),
            })
            .collect();

        let minutes = estimate_minutes(config.profiles.len(), config.additional_packages.len());

        Self {
            device: config.device.clone(),
            hostname: config.hostname.clone(),
            username: config.username.clone(),
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
            kernel: config.kernel.to_string(),
            filesystem: config.filesystem.to_string(),
            swap: config.swap.to_string(),
            profiles,
            additional_packages: config.additional_packages.clone(),
            estimated_time: format_estimate(minutes),
        }
    }
}

impl fmt::Display for InstallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device:      {}", self.device)?;
        writeln!(f, "Hostname:    {}", self.hostname)?;
        writeln!(f, "Username:    {}", self.username)?;
        writeln!(f, "Locale:      {}", self.locale)?;
        writeln!(f, "Timezone:    {}", self.timezone)?;
        writeln!(f, "Kernel:      {}", self.kernel)?;
        writeln!(f, "Filesystem:  {}", self.filesystem)?;
        writeln!(f, "Swap:        {}", self.swap)?;

        if self.profiles.is_empty() {
            writeln!(f, "Profiles:    none")?;
        } else {
            writeln!(f, "Profiles:")?;
            for p in &self.profiles {
                match p.package_count {
                    Some(n) => writeln!(f, "  - {} ({} packages): {}", p.name, n, p.description)?,
                    None => writeln!(f, "  - {} (unavailable): {}", p.name, p.description)?,
                }
            }
        }

        if self.additional_packages.is_empty() {
            writeln!(f, "Packages:    none")?;
        } else {
            writeln!(f, "Packages:    {}", self.additional_packages.join(", "))?;
        }
        write!(f, "Estimated:   {}", self.estimated_time)
    }
}

// ============================================================================
// Estimate
// ============================================================================

/// Estimated install time in whole minutes, rounded down.
pub fn estimate_minutes(profile_count: usize, package_count: usize) -> u64 {
    let secs = BASE_ESTIMATE_SECS
        + PER_PROFILE_SECS * profile_count as u64
        + PER_PACKAGE_SECS * package_count as u64;
    secs / 60
}

pub fn format_estimate(minutes: u64) -> String {
    if minutes < 60 {
        format!("~{} minutes", minutes)
    } else {
        format!("~{}h {}m", minutes / 60, minutes % 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
