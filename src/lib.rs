//! GamerX installer library
//!
//! The installation pipeline behind the `gxinstall` binary: disk planning
//! and partitioning, base system bootstrap, system configuration, profile
//! installation and mirror selection.

pub mod cli;
pub mod command_runner;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod install_state;
pub mod installer;
pub mod logic;
pub mod mirrors;
pub mod paths;
pub mod process_guard;
pub mod profiles;
pub mod progress;
pub mod sanity;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use command_runner::{CommandOutput, CommandRunner, CommandSpec, DryRunRunner, SystemRunner};
pub use config_file::InstallConfig;
pub use error::{ErrorKind, InstallationError, Stage, ToolFailure};
pub use install_state::{InstallStage, InstallTransitionError, InstallerContext};
pub use installer::{InstallReport, Installer};
pub use paths::InstallPaths;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use progress::{ProgressEvent, ProgressSink};
pub use types::{Filesystem, Kernel, SwapPolicy};

// Hardware facts
pub use hardware::{FirmwareMode, MemoryInfo, ProcMeminfo};

// Disk engine
pub use engine::partition::{DiskExecutor, PartitionResult};
pub use engine::storage::{DiskCheck, DiskPlan, DiskPlanner, DiskRejection};

// Mirrors
pub use mirrors::{MirrorCache, MirrorRanking, MirrorResult, MirrorTester};

// Profiles
pub use logic::postinstall::{ProfileInstaller, ProfileOutcome, ProfileReport};
pub use profiles::{BundleDefect, ProfileBundle};
