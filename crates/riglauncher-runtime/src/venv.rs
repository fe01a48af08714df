use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use riglauncher_core::LauncherError;

use crate::command::run_command;
use crate::platform::{clean_project_name, HostPlatform};
use crate::process::{kill_matching, wait_until_gone};

/// External tool that constructs isolated runtime environments.
const ENV_TOOL: &str = "virtualenv";

const HANDLE_RELEASE_ATTEMPTS: u32 = 10;
const HANDLE_RELEASE_INTERVAL: Duration = Duration::from_millis(100);

/// An isolated runtime environment on disk: its root plus the resolved
/// runtime and dependency-installer binaries.
///
/// Only valid while both binaries exist; never deleted implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    root: PathBuf,
    runtime_binary: PathBuf,
    installer_binary: PathBuf,
}

impl EnvironmentHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runtime_binary(&self) -> &Path {
        &self.runtime_binary
    }

    pub fn installer_binary(&self) -> &Path {
        &self.installer_binary
    }

    /// Integrity check beyond bare directory existence.
    pub fn is_valid(&self) -> bool {
        self.runtime_binary.is_file() && self.installer_binary.is_file()
    }
}

/// Manages the named isolated environment of one project.
#[derive(Debug, Clone)]
pub struct RuntimeEnvironment {
    platform: HostPlatform,
    clean_name: String,
}

impl RuntimeEnvironment {
    pub fn new(platform: HostPlatform, project_name: &str) -> Self {
        Self {
            platform,
            clean_name: clean_project_name(project_name),
        }
    }

    pub fn clean_name(&self) -> &str {
        &self.clean_name
    }

    /// Deterministic environment directory under the install root.
    pub fn env_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.clean_name)
    }

    /// Resolves the per-platform binary paths for an environment directory.
    pub fn resolve_paths(&self, env_dir: &Path) -> EnvironmentHandle {
        let scripts = env_dir.join(self.platform.scripts_dir());
        EnvironmentHandle {
            root: env_dir.to_path_buf(),
            runtime_binary: scripts.join(self.platform.executable("python")),
            installer_binary: scripts.join(self.platform.executable("pip")),
        }
    }

    /// Whether an environment directory exists but is missing the subfolders
    /// a healthy installation carries; such a directory is a leftover from a
    /// partial or older install.
    pub fn is_stale(&self, install_root: &Path) -> bool {
        let env_dir = self.env_dir(install_root);
        if !env_dir.is_dir() {
            return false;
        }
        self.platform
            .expected_env_subdirs()
            .iter()
            .any(|subdir| !env_dir.join(subdir).is_dir())
    }

    /// Ensures the environment exists, creating it with the external
    /// environment tool when absent or when `force_recreate` is set.
    ///
    /// An existing directory with `force_recreate` unset is accepted as-is
    /// without validation; callers wanting more call
    /// [`EnvironmentHandle::is_valid`].
    pub fn ensure(&self, install_root: &Path, force_recreate: bool) -> Result<EnvironmentHandle> {
        let env_dir = self.env_dir(install_root);
        if force_recreate || !env_dir.is_dir() {
            // Still-running instances hold file locks inside the environment;
            // clear them and wait briefly for handles to be released.
            let prefix = self.clean_name.clone();
            let matcher =
                move |name: &str| name.starts_with(&prefix) || name.starts_with("python");
            let killed = kill_matching(&matcher);
            if killed > 0 {
                info!(killed, "terminated processes holding the environment");
                wait_until_gone(&matcher, HANDLE_RELEASE_ATTEMPTS, HANDLE_RELEASE_INTERVAL);
            }
        }

        self.ensure_with_runner(install_root, force_recreate, |env_dir| {
            run_command(
                Command::new(ENV_TOOL).arg(env_dir),
                "environment creation tool failed",
            )
        })
    }

    /// [`RuntimeEnvironment::ensure`] with an injectable creation step and
    /// no process clearing; the seam the tests drive.
    pub fn ensure_with_runner<R>(
        &self,
        install_root: &Path,
        force_recreate: bool,
        mut create: R,
    ) -> Result<EnvironmentHandle>
    where
        R: FnMut(&Path) -> Result<()>,
    {
        let env_dir = self.env_dir(install_root);

        if !force_recreate && env_dir.is_dir() {
            debug!(env_dir = %env_dir.display(), "environment already present");
            return Ok(self.resolve_paths(&env_dir));
        }

        if env_dir.exists() {
            info!(env_dir = %env_dir.display(), "removing existing environment");
            fs::remove_dir_all(&env_dir).with_context(|| {
                format!("failed to remove environment: {}", env_dir.display())
            })?;
        }

        info!(env_dir = %env_dir.display(), "creating isolated environment");
        create(&env_dir).map_err(|err| {
            LauncherError::EnvironmentCreationFailed(format!(
                "{}: {err:#}",
                env_dir.display()
            ))
        })?;

        Ok(self.resolve_paths(&env_dir))
    }

    /// Destroys the environment directory if present. Explicit only; used by
    /// uninstall.
    pub fn destroy(&self, install_root: &Path) -> Result<()> {
        let env_dir = self.env_dir(install_root);
        if env_dir.is_dir() {
            fs::remove_dir_all(&env_dir).with_context(|| {
                format!("failed to remove environment: {}", env_dir.display())
            })?;
        }
        Ok(())
    }
}

/// Locates the site-packages directory under an environment root, if one
/// exists. Windows keeps it at a fixed `Lib\site-packages`; unix layouts nest
/// it inside a per-interpreter `lib/pythonX.Y` directory, where the
/// newest-named interpreter wins.
pub fn site_packages_dir(platform: HostPlatform, base: &Path) -> Option<PathBuf> {
    match platform {
        HostPlatform::Windows => {
            let candidate = base.join("Lib").join("site-packages");
            candidate.is_dir().then_some(candidate)
        }
        HostPlatform::MacOs | HostPlatform::Linux => {
            let mut candidates: Vec<PathBuf> = fs::read_dir(base.join("lib"))
                .ok()?
                .flatten()
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
                .map(|entry| entry.path().join("site-packages"))
                .filter(|candidate| candidate.is_dir())
                .collect();
            candidates.sort();
            candidates.pop()
        }
    }
}
