use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::SwapPolicy;

/// GamerX Installer - Arch Linux installation pipeline
#[derive(Parser, Debug)]
#[command(name = "gxinstall")]
#[command(about = "Installs GamerX Linux from a configuration file")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Destructive tools (wipefs, sgdisk, mkfs, pacstrap, ...) are logged
    /// and skipped. Read-only queries such as lsblk still execute so disk
    /// checks stay realistic. Files are written below a scratch directory.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a headless installation
    Install {
        /// Path to the installation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Skip the confirmation prompt before the disk is erased
        #[arg(short, long)]
        yes: bool,

        /// Pick the fastest reachable mirror when the config names none
        #[arg(long)]
        fastest_mirror: bool,

        /// Skip the root privilege check
        #[arg(long, hide = true)]
        skip_root_check: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Check whether a disk can take an installation
    CheckDisk {
        /// Block device, e.g. /dev/sda
        device: PathBuf,

        /// Swap policy: none, auto, <N>G or <N>M
        #[arg(short, long, default_value = "auto")]
        swap: SwapPolicy,
    },
    /// Measure mirror latency and print the ranking
    Mirrors {
        /// Show only the first N results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
    /// List profile bundles in the live catalog
    Profiles {
        /// Catalog directory (defaults to the live profiles directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show what an installation would do and how long it takes
    Summary {
        /// Path to the installation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
