//! gxinstall - command line entry point
//!
//! Headless front end for the installation pipeline: run an installation
//! from a config file, or inspect disks, mirrors and profiles.

use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use gxinstall::cli::{Cli, Commands};
use gxinstall::command_runner::{CommandRunner, DryRunRunner, SystemRunner};
use gxinstall::config_file::InstallConfig;
use gxinstall::engine::storage::{DiskCheck, DiskPlanner};
use gxinstall::hardware::ProcMeminfo;
use gxinstall::installer::Installer;
use gxinstall::logic::preinstall::InstallSummary;
use gxinstall::mirrors::{DEFAULT_CACHE_TTL, MirrorCache, MirrorTester};
use gxinstall::paths::InstallPaths;
use gxinstall::process_guard::{self, ProcessGuard};
use gxinstall::profiles;
use gxinstall::progress::ProgressEvent;
use gxinstall::sanity;
use gxinstall::types::SwapPolicy;

const LOG_DIR: &str = "/tmp/gxinstall-logs";
const DRY_RUN_ROOT: &str = "/tmp/gxinstall-dry-run";

/// stderr for humans, plus a plain-text log file when it can be opened.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, file_error) = match open_log_file() {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("File logging disabled: {:#}", e);
    }
}

fn open_log_file() -> Result<File> {
    fs::create_dir_all(LOG_DIR).with_context(|| format!("Failed to create {}", LOG_DIR))?;
    let path = Path::new(LOG_DIR).join("install.log");
    File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    // Terminates tracked tools on every exit path out of main.
    let _guard = ProcessGuard::new();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let runner: Box<dyn CommandRunner> = if cli.dry_run {
        info!("Dry-run mode: destructive commands will be skipped");
        Box::new(DryRunRunner::new(SystemRunner))
    } else {
        Box::new(SystemRunner)
    };

    match cli.command {
        Commands::Install {
            config,
            yes,
            fastest_mirror,
            skip_root_check,
        } => run_install(
            runner.as_ref(),
            &config,
            InstallOptions {
                dry_run: cli.dry_run,
                assume_yes: yes,
                fastest_mirror,
                skip_root_check,
            },
        ),
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            info!("Configuration validation successful");
            println!("✓ Configuration file is valid: {:?}", config);
            Ok(())
        }
        Commands::CheckDisk { device, swap } => check_disk(runner.as_ref(), &device, swap),
        Commands::Mirrors { limit, json } => list_mirrors(limit, json),
        Commands::Profiles { dir } => {
            list_profiles(&dir.unwrap_or_else(|| InstallPaths::default().live_profiles_dir));
            Ok(())
        }
        Commands::Summary { config } => {
            let config = load_config(&config)?;
            let summary =
                InstallSummary::build(&config, &InstallPaths::default().live_profiles_dir);
            println!("{}", summary);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<InstallConfig> {
    info!("Loading configuration from: {}", path.display());
    let config = InstallConfig::load_from_file(path)?;
    config
        .validate()
        .with_context(|| format!("Configuration validation failed for {}", path.display()))?;
    Ok(config)
}

// ============================================================================
// install
// ============================================================================

struct InstallOptions {
    dry_run: bool,
    assume_yes: bool,
    fastest_mirror: bool,
    skip_root_check: bool,
}

fn run_install(
    runner: &dyn CommandRunner,
    config_path: &Path,
    options: InstallOptions,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if !options.dry_run && !sanity::run_preflight_checks(options.skip_root_check) {
        anyhow::bail!("Pre-flight checks failed");
    }

    if options.fastest_mirror && config.mirror_url.is_none() {
        let ranking =
            MirrorCache::global().get_cached(&MirrorTester::worldwide(), DEFAULT_CACHE_TTL);
        match ranking.fastest() {
            Some(best) => {
                info!("Fastest mirror: {}", best.display_name());
                config.mirror_url = Some(best.url.clone());
            }
            None => warn!("No mirror reachable, keeping the live mirrorlist"),
        }
    }

    let paths = if options.dry_run {
        InstallPaths {
            mount_point: PathBuf::from(DRY_RUN_ROOT).join("mnt"),
            ..InstallPaths::default()
        }
    } else {
        InstallPaths::default()
    };

    println!("{}", InstallSummary::build(&config, &paths.live_profiles_dir));
    println!();
    if !options.dry_run && !options.assume_yes && !confirm_erase(&config.device)? {
        println!("Installation cancelled");
        return Ok(());
    }

    let memory = ProcMeminfo::new();
    let mut installer = Installer::new(runner, &memory, &paths).confirm_destructive();
    let mut print_event = |event: ProgressEvent| println!("{}", event);
    let report = installer.run(&config, &mut print_event)?;

    println!();
    println!("✓ Installation completed successfully!");
    println!("  {}", report.plan.summary());
    println!("{}", report.profiles);
    if report.profiles.has_failures() {
        println!("Some optional components failed; see {}/install.log", LOG_DIR);
    }
    if report.root_password_set == Some(false) {
        println!("Root password was not set; run `passwd` after first boot");
    }
    Ok(())
}

fn confirm_erase(device: &str) -> Result<bool> {
    print!("ALL DATA ON {} WILL BE ERASED. Type 'yes' to continue: ", device);
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(answer.trim() == "yes")
}

// ============================================================================
// Inspection commands
// ============================================================================

fn check_disk(runner: &dyn CommandRunner, device: &Path, swap: SwapPolicy) -> Result<()> {
    let memory = ProcMeminfo::new();
    let check = DiskPlanner::new(runner, &memory).validate(device, swap)?;
    println!("{}", check);
    if let DiskCheck::Suitable(plan) = &check {
        println!("  {}", plan.summary());
        Ok(())
    } else {
        anyhow::bail!("{} is not suitable for installation", device.display())
    }
}

fn list_mirrors(limit: Option<usize>, json: bool) -> Result<()> {
    let tester = MirrorTester::worldwide();
    info!("Testing {} mirrors", tester.catalog().len());
    let ranking = MirrorCache::global().get_cached(&tester, DEFAULT_CACHE_TTL);
    let shown = limit.unwrap_or(ranking.len()).min(ranking.len());
    let results = &ranking.results()[..shown];

    if json {
        let out = serde_json::to_string_pretty(results).context("Failed to serialize ranking")?;
        println!("{}", out);
    } else {
        for (i, result) in results.iter().enumerate() {
            println!("{:>2}. {:<40} {}", i + 1, result.display_name(), result.url);
        }
        println!(
            "{} of {} mirrors reachable",
            ranking.reachable_count(),
            ranking.len()
        );
    }
    Ok(())
}

fn list_profiles(catalog: &Path) {
    let discovery = profiles::discover(catalog);
    if discovery.bundles.is_empty() {
        println!("No valid profiles in {}", catalog.display());
    }
    for bundle in &discovery.bundles {
        println!(
            "{:<14} {:>3} packages  {}",
            bundle.name,
            bundle.packages.len(),
            bundle.description()
        );
    }
    for (name, defect) in &discovery.skipped {
        println!("{:<14} skipped: {}", name, defect);
    }
}
