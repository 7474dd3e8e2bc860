//! Post-install orchestration: profiles, AUR helper, theme overlay
//!
//! Runs after the base system is configured, inside the target root.
//!
//! # Failure Policy
//!
//! Everything in this module is **non-fatal**. A broken desktop profile,
//! a failed AUR build or a missing theme never aborts the installation:
//! each step ends as a [`ProfileOutcome`] in the [`ProfileReport`] and the
//! loop moves on.
//!
//! # Privilege Dropping
//!
//! Profile entrypoints run as root in the chroot and receive the target
//! user in `INSTALL_USER`. The AUR helper and theme builds run as the user
//! through `su`, since `makepkg` refuses to run as root.

use std::fmt;

use tracing::{error, info, warn};

use crate::command_runner::{CommandRunner, StageRunner};
use crate::config_file::InstallConfig;
use crate::error::{InstallationError, Result, Stage};
use crate::install_state::InstallStage;
use crate::paths::{InstallPaths, LIVE_PROFILES_DIR};
use crate::profiles::{HYPRLAND, INSTALL_SCRIPT, ProfileBundle};
use crate::progress::ProgressTracker;
use crate::tools::disk::Chmod;
use crate::tools::system::{ChrootScript, InChroot, RunAsUser};

pub const YAY_BUILD: &str = "cd /tmp && rm -rf yay && git clone https://aur.archlinux.org/yay.git \
                             && cd yay && makepkg -si --noconfirm";

pub const HYDE_INSTALL: &str = "cd /tmp && git clone --depth 1 \
                                https://github.com/prasanthrangan/hyprdots.git HyDE \
                                && cd HyDE && ./install.sh";

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOutcome {
    Installed,
    /// Not attempted (disabled or not applicable).
    Skipped(String),
    Failed(String),
}

impl fmt::Display for ProfileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub outcome: ProfileOutcome,
}

/// Outcome of every post-install step, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileReport {
    /// Selected profiles.
    pub profiles: Vec<ProfileEntry>,
    /// AUR helper and theme overlay.
    pub extras: Vec<ProfileEntry>,
}

impl ProfileReport {
    pub fn outcome(&self, name: &str) -> Option<&ProfileOutcome> {
        self.profiles
            .iter()
            .chain(&self.extras)
            .find(|e| e.name == name)
            .map(|e| &e.outcome)
    }

    pub fn installed(&self) -> Vec<&str> {
        self.profiles
            .iter()
            .filter(|e| e.outcome == ProfileOutcome::Installed)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Every failed step with its reason, extras included.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.profiles
            .iter()
            .chain(&self.extras)
            .filter_map(|e| match &e.outcome {
                ProfileOutcome::Failed(reason) => Some((e.name.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty() && self.extras.is_empty()
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No profiles selected");
        }
        let lines: Vec<String> = self
            .profiles
            .iter()
            .chain(&self.extras)
            .map(|e| format!("{}: {}", e.name, e.outcome))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

// ============================================================================
// Installer
// ============================================================================

pub struct ProfileInstaller<'a> {
    runner: StageRunner<'a>,
    paths: &'a InstallPaths,
}

impl<'a> ProfileInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a InstallPaths) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Profile),
            paths,
        }
    }

    /// Install one profile from the copy inside the target root.
    ///
    /// # Errors
    ///
    /// A Profile-stage error when the bundle is invalid in the target or
    /// its entrypoint fails. Callers treat it as non-fatal.
    pub fn install(&self, name: &str, username: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(InstallationError::invalid(
                Stage::Profile,
                format!("invalid profile name '{}'", name),
            ));
        }

        let dir = self.paths.target_profiles_dir().join(name);
        let bundle = ProfileBundle::load(&dir).map_err(|defect| {
            InstallationError::invalid(
                Stage::Profile,
                format!("profile {} invalid in target: {}", name, defect),
            )
        })?;
        info!(
            "Installing profile {} ({} packages)",
            bundle.name,
            bundle.packages.len()
        );

        let script = format!("{}/{}/{}", LIVE_PROFILES_DIR, name, INSTALL_SCRIPT);
        let chmod = Chmod {
            mode: "+x",
            path: script.clone().into(),
        };
        self.runner
            .run(&InChroot::new(&self.paths.mount_point, &chmod))?;
        self.runner.run(&ChrootScript {
            root: self.paths.mount_point.clone(),
            script,
            env: vec![("INSTALL_USER".to_string(), username.to_string())],
        })?;

        info!("Profile {} installed", name);
        Ok(())
    }

    pub fn install_aur_helper(&self, username: &str) -> ProfileOutcome {
        info!("Installing yay AUR helper for {}", username);
        self.run_as_user(username, YAY_BUILD, "yay")
    }

    pub fn install_theme_overlay(&self, username: &str) -> ProfileOutcome {
        info!("Installing HyDE theme for {}", username);
        self.run_as_user(username, HYDE_INSTALL, "HyDE theme")
    }

    fn run_as_user(&self, username: &str, command: &str, label: &str) -> ProfileOutcome {
        let tool = RunAsUser {
            root: self.paths.mount_point.clone(),
            username: username.to_string(),
            command: command.to_string(),
        };
        match self.runner.run(&tool) {
            Ok(_) => {
                info!("{} installed", label);
                ProfileOutcome::Installed
            }
            Err(e) => {
                warn!("{} installation failed, user can retry after reboot: {}", label, e);
                ProfileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run every post-install step for `config`, reporting progress in the
    /// 55-70 band. Never fails; see the report for outcomes.
    pub fn run_all(
        &self,
        config: &InstallConfig,
        tracker: &mut ProgressTracker<'_>,
    ) -> ProfileReport {
        let mut report = ProfileReport::default();
        let done = InstallStage::InstallProfiles.completion_percent();
        let profiles = &config.profiles;

        if profiles.is_empty() {
            info!("No profiles selected for installation");
            tracker.report("Skipping profile installation", done, None);
            return report;
        }

        tracker.report(
            &format!("Installing {} profile(s)...", profiles.len()),
            InstallStage::InstallProfiles.progress_percent(),
            None,
        );

        let aur = if config.aur_helper {
            self.install_aur_helper(&config.username)
        } else {
            ProfileOutcome::Skipped("disabled".to_string())
        };
        report.extras.push(ProfileEntry {
            name: "yay".to_string(),
            outcome: aur,
        });

        let count = profiles.len();
        for (i, name) in profiles.iter().enumerate() {
            let percent = 60 + (i * 10 / count) as u8;
            tracker.report(&format!("Installing profile: {}", name), percent, None);

            let outcome = match self.install(name, &config.username) {
                Ok(()) => ProfileOutcome::Installed,
                Err(e) => {
                    error!("Profile {} installation failed: {}", name, e);
                    ProfileOutcome::Failed(e.to_string())
                }
            };
            report.profiles.push(ProfileEntry {
                name: name.clone(),
                outcome,
            });
        }

        if profiles.iter().any(|p| p == HYPRLAND) {
            let theme = if config.theme_overlay {
                tracker.report("Installing HyDE theme...", 68, None);
                self.install_theme_overlay(&config.username)
            } else {
                ProfileOutcome::Skipped("disabled".to_string())
            };
            report.extras.push(ProfileEntry {
                name: "HyDE".to_string(),
                outcome: theme,
            });
        }

        tracker.report("Profile installation completed", done, None);
        report
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::test_support::write_bundle;
    use crate::progress::ProgressEvent;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;

    fn config(profiles: &[&str]) -> InstallConfig {
        InstallConfig {
            device: "/dev/sdx".to_string(),
            hostname: "gx-test".to_string(),
            username: "gamer".to_string(),
            password: "validpass1".to_string(),
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
            ..InstallConfig::default()
        }
    }

    fn run(
        runner: &ScriptedRunner,
        paths: &InstallPaths,
        config: &InstallConfig,
    ) -> (ProfileReport, Vec<ProgressEvent>) {
        let mut events = Vec::new();
        let mut sink = |e: ProgressEvent| events.push(e);
        let report = {
            let mut tracker = ProgressTracker::new(&mut sink);
            ProfileInstaller::new(runner, paths).run_all(config, &mut tracker)
        };
        (report, events)
    }

    #[test]
    fn test_install_runs_entrypoint_with_user_env() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        write_bundle(&paths.target_profiles_dir(), "Gaming", "steam\n", 0o755);
        let runner = ScriptedRunner::new();

        ProfileInstaller::new(&runner, &paths)
            .install("Gaming", "gamer")
            .unwrap();

        let mnt = paths.mount_point.display().to_string();
        let calls = runner.calls();
        assert_eq!(
            calls[0].command_line(),
            format!("arch-chroot {} chmod +x /usr/local/bin/profiles/Gaming/install.sh", mnt)
        );
        assert_eq!(
            calls[1].command_line(),
            format!("arch-chroot {} /usr/local/bin/profiles/Gaming/install.sh", mnt)
        );
        assert_eq!(
            calls[1].env,
            vec![("INSTALL_USER".to_string(), "gamer".to_string())]
        );
    }

    #[test]
    fn test_install_rejects_bundle_missing_in_target() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        let err = ProfileInstaller::new(&runner, &paths)
            .install("Gaming", "gamer")
            .unwrap_err();
        assert_eq!(err.stage, Stage::Profile);
        assert!(!err.stage.is_fatal());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_install_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        let installer = ProfileInstaller::new(&runner, &paths);
        assert!(installer.install("../etc", "gamer").is_err());
        assert!(installer.install("", "gamer").is_err());
    }

    #[test]
    fn test_loop_continues_past_invalid_profile() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let catalog = paths.target_profiles_dir();
        write_bundle(&catalog, "A", "pkg-a\n", 0o755);
        write_bundle(&catalog, "B", "pkg-b\n", 0o644);
        write_bundle(&catalog, "C", "pkg-c\n", 0o755);
        let runner = ScriptedRunner::new();

        let (report, _) = run(&runner, &paths, &config(&["A", "B", "C"]));

        assert_eq!(report.installed(), vec!["A", "C"]);
        assert!(matches!(
            report.outcome("B"),
            Some(ProfileOutcome::Failed(r)) if r.contains("not executable")
        ));
        assert_eq!(report.failures().len(), 1);
        assert!(runner.position("/usr/local/bin/profiles/C/install.sh").is_some());
    }

    #[test]
    fn test_failing_entrypoint_recorded() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        write_bundle(&paths.target_profiles_dir(), "A", "pkg\n", 0o755);
        write_bundle(&paths.target_profiles_dir(), "C", "pkg\n", 0o755);
        let runner = ScriptedRunner::new().fail_when(
            "arch-chroot",
            "/A/install.sh",
            1,
            "pacman: conflict",
        );

        let (report, _) = run(&runner, &paths, &config(&["A", "C"]));
        assert!(matches!(
            report.outcome("A"),
            Some(ProfileOutcome::Failed(r)) if r.contains("conflict")
        ));
        assert_eq!(report.outcome("C"), Some(&ProfileOutcome::Installed));
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        let (report, events) = run(&runner, &paths, &config(&[]));
        assert!(report.is_empty());
        assert!(!report.has_failures());
        assert!(runner.calls().is_empty());
        assert_eq!(events.last().map(|e| e.percent), Some(70));
    }

    #[test]
    fn test_aur_and_theme_failures_are_non_fatal() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        write_bundle(&paths.target_profiles_dir(), "Hyprland", "hyprland\n", 0o755);
        let runner = ScriptedRunner::new()
            .fail_when("arch-chroot", "makepkg", 1, "makepkg failed")
            .fail_when("arch-chroot", "hyprdots", 128, "could not resolve host");

        let (report, events) = run(&runner, &paths, &config(&["Hyprland"]));
        assert_eq!(report.installed(), vec!["Hyprland"]);
        assert!(matches!(report.outcome("yay"), Some(ProfileOutcome::Failed(_))));
        assert!(matches!(report.outcome("HyDE"), Some(ProfileOutcome::Failed(_))));

        let percents: Vec<i32> = events.iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![55, 60, 68, 70]);
    }

    #[test]
    fn test_disabled_extras_are_skipped() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        write_bundle(&paths.target_profiles_dir(), "Hyprland", "hyprland\n", 0o755);
        let runner = ScriptedRunner::new();
        let mut config = config(&["Hyprland"]);
        config.aur_helper = false;
        config.theme_overlay = false;

        let (report, _) = run(&runner, &paths, &config);
        assert!(matches!(report.outcome("yay"), Some(ProfileOutcome::Skipped(_))));
        assert!(matches!(report.outcome("HyDE"), Some(ProfileOutcome::Skipped(_))));
        assert!(!runner.command_lines().iter().any(|l| l.contains(" su ")));
    }

    #[test]
    fn test_yay_runs_as_user() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new();
        assert_eq!(
            ProfileInstaller::new(&runner, &paths).install_aur_helper("gamer"),
            ProfileOutcome::Installed
        );
        let call = &runner.calls()[0];
        assert_eq!(&call.args[1..4], &["su", "-", "gamer"]);
        assert!(call.args[5].contains("makepkg -si --noconfirm"));
    }

    #[test]
    fn test_report_display() {
        let report = ProfileReport {
            profiles: vec![ProfileEntry {
                name: "A".to_string(),
                outcome: ProfileOutcome::Installed,
            }],
            extras: vec![ProfileEntry {
                name: "yay".to_string(),
                outcome: ProfileOutcome::Skipped("disabled".to_string()),
            }],
        };
        assert_eq!(report.to_string(), "A: installed\nyay: skipped: disabled");
        assert_eq!(ProfileReport::default().to_string(), "No profiles selected");
    }
}
