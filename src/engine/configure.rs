//! System configuration of the bootstrapped target.
//!
//! Hostname, locale, timezone, the primary user and services. File formats
//! are dictated by the target OS and written byte for byte; commands run in
//! the target via `arch-chroot`.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use tracing::{info, warn};

use super::write_file;
use crate::command_runner::{CommandRunner, StageRunner};
use crate::error::{InstallationError, Result, Stage};
use crate::paths::InstallPaths;
use crate::tools::ToolArgs;
use crate::tools::system::{
    Chpasswd, Hwclock, InChroot, LinkTimezone, LocaleGen, SystemctlEnable, UserAdd,
};

pub const ESSENTIAL_SERVICES: &[&str] = &["NetworkManager", "systemd-timesyncd"];

pub struct SystemConfigurator<'a> {
    runner: StageRunner<'a>,
    paths: &'a InstallPaths,
}

impl<'a> SystemConfigurator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a InstallPaths) -> Self {
        Self {
            runner: StageRunner::new(runner, Stage::Configure),
            paths,
        }
    }

    fn chroot(&self, tool: &dyn ToolArgs) -> Result<()> {
        self.runner
            .run(&InChroot::new(&self.paths.mount_point, tool))
            .map(|_| ())
    }

    pub fn set_hostname(&self, hostname: &str) -> Result<()> {
        write_file(
            Stage::Configure,
            &self.paths.target("/etc/hostname"),
            &format!("{}\n", hostname),
        )?;
        write_file(
            Stage::Configure,
            &self.paths.target("/etc/hosts"),
            &hosts_file(hostname),
        )?;
        info!("Hostname set: {}", hostname);
        Ok(())
    }

    pub fn configure_locale(&self, locale: &str) -> Result<()> {
        let locale_gen = self.paths.target("/etc/locale.gen");
        let current = match fs::read_to_string(&locale_gen) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} missing, creating it", locale_gen.display());
                String::new()
            }
            Err(e) => {
                return Err(InstallationError::io(
                    Stage::Configure,
                    format!("reading {}", locale_gen.display()),
                    e,
                ));
            }
        };
        write_file(Stage::Configure, &locale_gen, &enable_locale(&current, locale))?;

        self.chroot(&LocaleGen)?;

        write_file(
            Stage::Configure,
            &self.paths.target("/etc/locale.conf"),
            &format!("LANG={}\n", locale),
        )?;
        info!("Locale configured: {}", locale);
        Ok(())
    }

    pub fn configure_timezone(&self, timezone: &str) -> Result<()> {
        self.chroot(&LinkTimezone {
            timezone: timezone.to_string(),
        })?;
        self.chroot(&Hwclock)?;
        info!("Timezone configured: {}", timezone);
        Ok(())
    }

    pub fn create_user(&self, username: &str, password: &str, sudo: bool) -> Result<()> {
        self.chroot(&UserAdd {
            username: username.to_string(),
        })?;
        self.chroot(&Chpasswd {
            username: username.to_string(),
            password: password.to_string(),
        })?;

        if sudo {
            let path = self.paths.target(&format!("/etc/sudoers.d/{}", username));
            write_file(
                Stage::Configure,
                &path,
                &format!("{} ALL=(ALL:ALL) ALL\n", username),
            )?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o440)).map_err(|e| {
                InstallationError::io(Stage::Configure, format!("chmod {}", path.display()), e)
            })?;
            info!("Sudo enabled for user: {}", username);
        }
        info!("User {} created", username);
        Ok(())
    }

    /// Failure is logged; the user account still allows login.
    pub fn set_root_password(&self, password: &str) -> bool {
        let chpasswd = Chpasswd {
            username: "root".to_string(),
            password: password.to_string(),
        };
        let ok = self
            .runner
            .run_best_effort(&InChroot::new(&self.paths.mount_point, &chpasswd));
        if ok {
            info!("Root password set");
        } else {
            warn!("Failed to set root password, continuing");
        }
        ok
    }

    pub fn enable_services(&self) -> Result<()> {
        self.chroot(&SystemctlEnable {
            units: ESSENTIAL_SERVICES.iter().map(|s| s.to_string()).collect(),
        })?;
        info!("Services enabled: {}", ESSENTIAL_SERVICES.join(", "));
        Ok(())
    }
}

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{h}.localdomain\t{h}\n",
        h = hostname
    )
}

/// Uncomment `locale` in a locale.gen body, appending it when absent.
pub fn enable_locale(locale_gen: &str, locale: &str) -> String {
    let commented_prefix = format!("#{} ", locale);
    let commented_exact = format!("#{}", locale);
    let enabled_prefix = format!("{} ", locale);

    let mut found = false;
    let mut out = String::with_capacity(locale_gen.len() + 32);
    for line in locale_gen.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&commented_prefix) || trimmed == commented_exact {
            out.push_str(&trimmed[1..]);
            found = true;
        } else {
            if trimmed.starts_with(&enabled_prefix) || trimmed == locale {
                found = true;
            }
            out.push_str(line);
        }
        out.push('\n');
    }

    if !found {
        out.push_str(&format!("{} {}\n", locale, charset_of(locale)));
    }
    out
}

fn charset_of(locale: &str) -> &str {
    match locale.split_once('.') {
        Some((_, charset)) if !charset.is_empty() => charset.split('@').next().unwrap_or(charset),
        _ => "ISO-8859-1",
    }
}
