//! Profile bundles.
//!
//! A profile is a curated software collection shipped as a directory:
//!
//! ```text
//! <catalog>/<Name>/
//! ├── install.sh                  executable entrypoint
//! └── packages/package-list.txt   one package per line, `#` comments
//! ```
//!
//! A bundle is valid only when the entrypoint exists and is executable and
//! the package list names at least one package. Discovery never fails: bad
//! bundles are reported next to the good ones with the reason they were
//! skipped.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

pub const INSTALL_SCRIPT: &str = "install.sh";
pub const PACKAGE_LIST: &str = "packages/package-list.txt";

/// Profile that triggers the HyDE theme overlay.
pub const HYPRLAND: &str = "Hyprland";

/// Why a directory is not a usable bundle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleDefect {
    #[error("profile directory not found: {0}")]
    NotFound(PathBuf),

    #[error("missing install.sh")]
    MissingScript,

    #[error("install.sh is not executable")]
    NotExecutable,

    #[error("missing packages/package-list.txt")]
    MissingPackageList,

    #[error("package list is empty")]
    EmptyPackageList,

    #[error("unreadable: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileBundle {
    pub name: String,
    pub path: PathBuf,
    pub packages: Vec<String>,
}

impl ProfileBundle {
    /// Validate the bundle directory at `dir`.
    pub fn load(dir: &Path) -> Result<Self, BundleDefect> {
        if !dir.is_dir() {
            return Err(BundleDefect::NotFound(dir.to_path_buf()));
        }

        let script = dir.join(INSTALL_SCRIPT);
        let mode = match fs::metadata(&script) {
            Ok(meta) if meta.is_file() => meta.permissions().mode(),
            Ok(_) => return Err(BundleDefect::MissingScript),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BundleDefect::MissingScript);
            }
            Err(e) => return Err(BundleDefect::Unreadable(e.to_string())),
        };
        if mode & 0o111 == 0 {
            return Err(BundleDefect::NotExecutable);
        }

        let list = dir.join(PACKAGE_LIST);
        let text = match fs::read_to_string(&list) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BundleDefect::MissingPackageList);
            }
            Err(e) => return Err(BundleDefect::Unreadable(e.to_string())),
        };
        let packages = parse_package_list(&text);
        if packages.is_empty() {
            return Err(BundleDefect::EmptyPackageList);
        }

        Ok(Self {
            name: bundle_name(dir),
            path: dir.to_path_buf(),
            packages,
        })
    }

    pub fn install_script(&self) -> PathBuf {
        self.path.join(INSTALL_SCRIPT)
    }

    pub fn description(&self) -> &'static str {
        description(&self.name)
    }
}

/// Package names in a package-list file, skipping blanks and `#` comments.
pub fn parse_package_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

pub fn description(name: &str) -> &'static str {
    match name {
        "Hyprland" => "Modern tiling window manager with beautiful animations",
        "Gaming" => "Optimized gaming setup with Steam, Lutris, and performance tools",
        "Hacking" => "Security and penetration testing tools collection",
        "Development" => "Complete development environment with IDEs and tools",
        "Multimedia" => "Media creation and editing software suite",
        _ => "Custom profile configuration",
    }
}

fn bundle_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Result of scanning a catalog directory.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Valid bundles, sorted by name.
    pub bundles: Vec<ProfileBundle>,
    pub skipped: Vec<(String, BundleDefect)>,
}

impl Discovery {
    pub fn find(&self, name: &str) -> Option<&ProfileBundle> {
        self.bundles.iter().find(|b| b.name == name)
    }
}

/// Scan `catalog` for bundles. A missing catalog yields an empty result.
pub fn discover(catalog: &Path) -> Discovery {
    let mut discovery = Discovery::default();

    let entries = match fs::read_dir(catalog) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Profiles directory {} not readable: {}", catalog.display(), e);
            return discovery;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match ProfileBundle::load(&path) {
            Ok(bundle) => discovery.bundles.push(bundle),
            Err(defect) => {
                let name = bundle_name(&path);
                warn!("Profile {}: {}, skipping", name, defect);
                discovery.skipped.push((name, defect));
            }
        }
    }

    discovery.bundles.sort_by(|a, b| a.name.cmp(&b.name));
    discovery.skipped.sort_by(|a, b| a.0.cmp(&b.0));
    info!("Discovered {} valid profiles", discovery.bundles.len());
    discovery
}
