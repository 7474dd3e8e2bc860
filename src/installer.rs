//! Installation pipeline
//!
//! Sequences the engine stages against one [`InstallConfig`]:
//!
//! ```text
//! ValidateConfig → PrepareDisk → InstallBase → ConfigureSystem
//!                → InstallProfiles → Finalize → Done
//! ```
//!
//! Each stage opens at [`InstallStage::progress_percent`] and closes at
//! [`InstallStage::completion_percent`], with fixed sub-step checkpoints in
//! between. The first fatal error moves the
//! run to `Failed`, emits a failure event, unmounts the target and is
//! returned tagged with its stage. Profile failures are collected in the
//! report instead. Nothing is retried at this level.

use tracing::{error, info, warn};

use crate::command_runner::{CommandRunner, StageRunner};
use crate::config_file::InstallConfig;
use crate::engine::bootstrap::SystemBootstrapper;
use crate::engine::configure::SystemConfigurator;
use crate::engine::finalize::Finalizer;
use crate::engine::partition::{DiskExecutor, PartitionResult};
use crate::engine::storage::{DiskPlan, DiskPlanner};
use crate::error::{InstallationError, Result, Stage};
use crate::hardware::MemoryInfo;
use crate::install_state::{InstallStage, InstallerContext};
use crate::logic::postinstall::{ProfileInstaller, ProfileReport};
use crate::paths::InstallPaths;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::tools::disk::{Umount, UmountMode};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub plan: DiskPlan,
    pub disk: PartitionResult,
    pub profiles: ProfileReport,
    /// `None` when no root password was requested.
    pub root_password_set: Option<bool>,
    pub stages: Vec<(InstallStage, u64)>,
}

pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    memory: &'a dyn MemoryInfo,
    paths: &'a InstallPaths,
    context: InstallerContext,
}

impl<'a> Installer<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        memory: &'a dyn MemoryInfo,
        paths: &'a InstallPaths,
    ) -> Self {
        Self {
            runner,
            memory,
            paths,
            context: InstallerContext::new(),
        }
    }

    /// Authorize the destructive disk stage. Without it the run stops
    /// before PrepareDisk.
    pub fn confirm_destructive(mut self) -> Self {
        self.context.confirm_destructive_operations();
        self
    }

    pub fn context(&self) -> &InstallerContext {
        &self.context
    }

    /// Run the whole pipeline, emitting progress into `sink`.
    ///
    /// # Errors
    ///
    /// The first fatal stage error. By then a failure event has been
    /// emitted and the target mount point has been unmounted (best effort).
    pub fn run(
        &mut self,
        config: &InstallConfig,
        sink: &mut dyn ProgressSink,
    ) -> Result<InstallReport> {
        let mut tracker = ProgressTracker::new(sink);
        info!("Starting GamerX Linux installation on {}", config.device);
        tracker.report(
            "Starting installation...",
            InstallStage::Start.progress_percent(),
            None,
        );

        match self.run_stages(config, &mut tracker) {
            Ok(report) => {
                tracker.report(
                    "Installation completed successfully!",
                    InstallStage::Done.progress_percent(),
                    None,
                );
                info!("GamerX Linux installation completed successfully");
                Ok(report)
            }
            Err(e) => {
                let stage = self.context.current_stage();
                error!("Installation failed during {}: {}", stage, e);
                if let Err(transition) = self.context.fail() {
                    warn!("{}", transition);
                }
                tracker.fail(stage.description(), format!("Installation failed: {}", e));
                self.cleanup(e.stage);
                Err(e)
            }
        }
    }

    fn run_stages(
        &mut self,
        config: &InstallConfig,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<InstallReport> {
        self.enter(InstallStage::ValidateConfig)?;
        config.validate().map_err(|e| {
            InstallationError::invalid(Stage::ConfigValidation, format!("{:#}", e))
        })?;
        info!("Configuration validation passed");
        tracker.report(
            "Configuration validated",
            InstallStage::ValidateConfig.completion_percent(),
            None,
        );

        self.enter(InstallStage::PrepareDisk)?;
        let (plan, disk) = self.prepare_disk(config, tracker)?;

        self.enter(InstallStage::InstallBase)?;
        self.install_base(config, &disk, tracker)?;

        self.enter(InstallStage::ConfigureSystem)?;
        let root_password_set = self.configure_system(config, tracker)?;

        self.enter(InstallStage::InstallProfiles)?;
        let profiles = ProfileInstaller::new(self.runner, self.paths).run_all(config, tracker);
        for (name, reason) in profiles.failures() {
            warn!(stage = %Stage::Profile, "{} not installed: {}", name, reason);
        }

        self.enter(InstallStage::Finalize)?;
        self.finalize(config, tracker)?;

        self.enter(InstallStage::Done)?;
        Ok(InstallReport {
            plan,
            disk,
            profiles,
            root_password_set,
            stages: self.context.stage_history().to_vec(),
        })
    }

    fn enter(&mut self, stage: InstallStage) -> Result<()> {
        let error_stage = stage.error_stage().unwrap_or(Stage::Finalize);
        self.context
            .transition_to(stage)
            .map_err(|e| InstallationError::invalid(error_stage, e.to_string()))?;
        Ok(())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn prepare_disk(
        &mut self,
        config: &InstallConfig,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<(DiskPlan, PartitionResult)> {
        tracker.report(
            "Preparing disk...",
            InstallStage::PrepareDisk.progress_percent(),
            Some(config.device.clone()),
        );

        let plan = DiskPlanner::new(self.runner, self.memory).plan(config)?;
        info!("{}", plan.summary());

        let disk = DiskExecutor::new(self.runner, self.paths).apply(&plan)?;

        tracker.report(
            "Disk preparation completed",
            InstallStage::PrepareDisk.completion_percent(),
            Some(format!("swap: {}GB", disk.swap_gb)),
        );
        Ok((plan, disk))
    }

    fn install_base(
        &self,
        config: &InstallConfig,
        disk: &PartitionResult,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        let bootstrapper = SystemBootstrapper::new(self.runner, self.paths);

        tracker.report(
            "Installing base system...",
            InstallStage::InstallBase.progress_percent(),
            Some(config.kernel.to_string()),
        );
        bootstrapper.install_base(config.kernel, &config.additional_packages)?;

        tracker.report("Generating fstab...", 20, None);
        bootstrapper.generate_fstab(disk.swap_file.is_some())?;

        tracker.report("Setting up network configuration...", 25, None);
        bootstrapper.configure_network(config.mirror_url.as_deref())?;

        tracker.report("Copying installer files...", 28, None);
        bootstrapper.copy_installer_files()?;

        tracker.report(
            "Base system installation completed",
            InstallStage::InstallBase.completion_percent(),
            None,
        );
        Ok(())
    }

    fn configure_system(
        &self,
        config: &InstallConfig,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Option<bool>> {
        let configurator = SystemConfigurator::new(self.runner, self.paths);

        tracker.report(
            "Configuring system...",
            InstallStage::ConfigureSystem.progress_percent(),
            Some(config.hostname.clone()),
        );
        configurator.set_hostname(&config.hostname)?;

        tracker.report("Configuring locale...", 38, Some(config.locale.clone()));
        configurator.configure_locale(&config.locale)?;

        tracker.report("Configuring timezone...", 41, Some(config.timezone.clone()));
        configurator.configure_timezone(&config.timezone)?;

        tracker.report(
            &format!("Creating user account: {}", config.username),
            44,
            None,
        );
        configurator.create_user(&config.username, &config.password, config.sudo)?;

        let root_password_set = config
            .root_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| configurator.set_root_password(p));

        tracker.report("Enabling services...", 47, None);
        configurator.enable_services()?;

        tracker.report(
            "System configuration completed",
            InstallStage::ConfigureSystem.completion_percent(),
            None,
        );
        Ok(root_password_set)
    }

    fn finalize(&self, config: &InstallConfig, tracker: &mut ProgressTracker<'_>) -> Result<()> {
        let finalizer = Finalizer::new(self.runner, self.paths);

        tracker.report(
            "Installing bootloader...",
            InstallStage::Finalize.progress_percent(),
            None,
        );
        finalizer.install_bootloader()?;

        if !config.additional_packages.is_empty() {
            tracker.report(
                "Installing additional packages...",
                90,
                Some(config.additional_packages.join(" ")),
            );
            finalizer.install_packages(&config.additional_packages)?;
        }

        tracker.report(
            "Finalizing installation...",
            InstallStage::Finalize.completion_percent(),
            None,
        );
        finalizer.sync()?;
        info!("Installation finalization completed");
        Ok(())
    }

    /// Unmount everything below the target, including mounts left over
    /// from an earlier attempt. Failures are logged and do not replace the
    /// original error.
    fn cleanup(&self, stage: Stage) {
        info!("Performing cleanup after installation failure...");
        let umount = Umount::new(&self.paths.mount_point).with_mode(UmountMode::Recursive);
        if StageRunner::new(self.runner, stage).run_best_effort(&umount) {
            info!("Cleanup completed");
        } else {
            error!("Cleanup failed, {} may still be mounted", self.paths.mount_point.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FixedMemory;
    use crate::progress::ProgressEvent;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;

    const DEVICE: &str = "/dev/sdx";

    fn config() -> InstallConfig {
        InstallConfig {
            device: DEVICE.to_string(),
            hostname: "gx-test".to_string(),
            username: "gamer".to_string(),
            password: "validpass1".to_string(),
            ..InstallConfig::default()
        }
    }

    fn run(
        runner: &ScriptedRunner,
        paths: &InstallPaths,
        config: &InstallConfig,
        confirm: bool,
    ) -> (Result<InstallReport>, Vec<ProgressEvent>) {
        let memory = FixedMemory(Some(4));
        let mut events = Vec::new();
        let mut sink = |e: ProgressEvent| events.push(e);
        let result = {
            let installer = Installer::new(runner, &memory, paths);
            let mut installer = if confirm { installer.confirm_destructive() } else { installer };
            installer.run(config, &mut sink)
        };
        (result, events)
    }

    fn only_unmount(paths: &InstallPaths) -> Vec<String> {
        vec![format!("umount -R {}", paths.mount_point.display())]
    }

    #[test]
    fn test_invalid_config_fails_before_any_command() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().with_disk(DEVICE, 25, false);
        let mut config = config();
        config.hostname = "-bad".to_string();

        let (result, events) = run(&runner, &paths, &config, true);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::ConfigValidation);
        assert_eq!(runner.command_lines(), only_unmount(&paths));
        assert!(events.last().unwrap().is_failure());
    }

    #[test]
    fn test_oversized_swap_fails_validation() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().with_disk(DEVICE, 25, false);
        let mut config = config();
        config.swap = crate::types::SwapPolicy::Fixed(u64::MAX);

        let (result, _) = run(&runner, &paths, &config, true);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::ConfigValidation);
        assert!(err.to_string().contains("Swap size too large"), "{}", err);
        assert!(!runner.invoked("lsblk"));
        assert!(!runner.invoked("wipefs"));
    }

    #[test]
    fn test_stage_checkpoints_come_from_install_stage() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().with_disk(DEVICE, 25, false);

        let (result, events) = run(&runner, &paths, &config(), true);
        assert!(result.is_ok());
        let percents: Vec<i32> = events.iter().map(|e| e.percent).collect();
        for stage in InstallStage::all_stages() {
            for percent in [stage.progress_percent(), stage.completion_percent()] {
                assert!(
                    percents.contains(&i32::from(percent)),
                    "{:?} checkpoint {} missing from {:?}",
                    stage,
                    percent,
                    percents
                );
            }
        }
    }

    #[test]
    fn test_unconfirmed_run_stops_before_disk() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().with_disk(DEVICE, 25, false);

        let (result, _) = run(&runner, &paths, &config(), false);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Disk);
        assert!(err.to_string().contains("confirmation"));
        assert_eq!(runner.command_lines(), only_unmount(&paths));
    }

    #[test]
    fn test_bootloader_failure_cleans_up() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new()
            .with_disk(DEVICE, 25, false)
            .fail_when("arch-chroot", "grub-install", 1, "no EFI");

        let (result, events) = run(&runner, &paths, &config(), true);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Finalize);

        let last = runner.command_lines().pop().unwrap();
        assert_eq!(last, format!("umount -R {}", paths.mount_point.display()));
        let failure = events.last().unwrap();
        assert!(failure.is_failure());
        assert!(failure.detail.as_deref().unwrap().contains("no EFI"));
    }

    #[test]
    fn test_cleanup_failure_keeps_original_error() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new()
            .with_disk(DEVICE, 25, false)
            .fail_when("genfstab", "", 1, "no mounts")
            .fail_when("umount", "-R", 32, "target is busy");

        let (result, _) = run(&runner, &paths, &config(), true);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Bootstrap);
        assert!(err.to_string().contains("no mounts"));
    }

    #[test]
    fn test_root_password_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new()
            .with_disk(DEVICE, 25, false)
            .respond(
                |spec| {
                    spec.program == "arch-chroot"
                        && spec.stdin.as_deref().is_some_and(|s| s.starts_with("root:"))
                },
                crate::command_runner::CommandOutput::failure(1, "denied"),
            );
        let mut config = config();
        config.root_password = Some("rootpass1".to_string());

        let (result, _) = run(&runner, &paths, &config, true);
        let report = result.unwrap();
        assert_eq!(report.root_password_set, Some(false));
    }

    #[test]
    fn test_stage_order_of_commands() {
        let dir = TempDir::new().unwrap();
        let paths = InstallPaths::rooted_at(dir.path());
        let runner = ScriptedRunner::new().with_disk(DEVICE, 25, false);

        let (result, _) = run(&runner, &paths, &config(), true);
        let report = result.unwrap();
        assert_eq!(report.stages.last().map(|s| s.0), Some(InstallStage::Done));

        let wipe = runner.position("wipefs").unwrap();
        let pacstrap = runner.position("pacstrap").unwrap();
        let useradd = runner.position("useradd").unwrap();
        let grub = runner.position("grub-install").unwrap();
        let lines = runner.command_lines();
        let sync = lines.iter().rposition(|l| l == "sync").unwrap();
        assert!(wipe < pacstrap && pacstrap < useradd && useradd < grub && grub < sync);
        assert!(!lines.iter().any(|l| l.starts_with("umount -R")));
    }
}
