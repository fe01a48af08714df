use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use riglauncher_core::{
    default_user_config_path, ConfigRecord, DecisionSink, LauncherError, ProgressSink, ReleaseTag,
    RepositorySlug, KEY_INSTALL_PATH, KEY_TAG,
};
use riglauncher_deploy::{fetch_release_feed, http_client, DeploymentInstaller};
use riglauncher_runtime::{
    check_prerequisites, kill_matching, site_packages_dir, wait_until_gone, EnvironmentHandle,
    HostPlatform, RuntimeEnvironment,
};

use crate::companion::CompanionHandoff;

const STARTUP_KILL_ATTEMPTS: u32 = 10;
const STARTUP_KILL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything one launcher run needs to know, assembled by the CLI; there is
/// no global state.
#[derive(Debug, Clone)]
pub struct LauncherContext {
    pub project_name: String,
    pub repository: RepositorySlug,
    pub install_path: Option<PathBuf>,
    pub requested_tag: Option<String>,
    pub manifest_name: Option<String>,
    pub companion_app: Option<String>,
    pub config_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub include_prereleases: bool,
    pub dev: bool,
    pub requirements_path: Option<PathBuf>,
    pub retry_ceiling: u32,
}

/// Phases of one launcher run, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    CheckPrerequisites,
    SelectInstallPath,
    ResolveVersion,
    EnsureEnvironment,
    Deploy,
    SupervisedHandoff,
    Ready,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Init => Some(Phase::CheckPrerequisites),
            Phase::CheckPrerequisites => Some(Phase::SelectInstallPath),
            Phase::SelectInstallPath => Some(Phase::ResolveVersion),
            Phase::ResolveVersion => Some(Phase::EnsureEnvironment),
            Phase::EnsureEnvironment => Some(Phase::Deploy),
            Phase::Deploy => Some(Phase::SupervisedHandoff),
            Phase::SupervisedHandoff => Some(Phase::Ready),
            Phase::Ready => None,
        }
    }
}

/// How to start the deployed toolset: the environment's runtime binary, the
/// bootstrap script, and the argument contract the script expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub runtime_binary: PathBuf,
    pub script_path: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Drives one full update-and-launch sequence. `run` takes `&mut self`, so a
/// given orchestrator can only have one deploy in flight.
pub struct UpdateOrchestrator {
    context: LauncherContext,
    platform: HostPlatform,
    environment: RuntimeEnvironment,
    config: ConfigRecord,
    phase: Phase,
}

impl UpdateOrchestrator {
    pub fn new(context: LauncherContext) -> Result<Self> {
        let platform = HostPlatform::current()?;
        let environment = RuntimeEnvironment::new(platform, &context.project_name);
        let config_path = match &context.config_path {
            Some(path) => path.clone(),
            None => default_user_config_path(environment.clean_name())?,
        };
        let config = ConfigRecord::load(config_path)?;

        Ok(Self {
            context,
            platform,
            environment,
            config,
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, phase: Phase) {
        debug!(?phase, "entering phase");
        self.phase = phase;
    }

    /// The full sequence: prerequisites, install path, version, environment,
    /// deploy, handoff. Returns the plan for starting the toolset.
    pub fn run(
        &mut self,
        progress: &mut dyn ProgressSink,
        decisions: &mut dyn DecisionSink,
    ) -> Result<LaunchPlan> {
        self.advance(Phase::Init);
        if !self.context.dev {
            // Other launcher instances of this project hold the same config
            // and environment; clear them before touching either.
            let killed = kill_matching(|name| name.starts_with(self.environment.clean_name()));
            if killed > 0 {
                info!(killed, "closed other running launcher instances");
                wait_until_gone(
                    |name| name.starts_with(self.environment.clean_name()),
                    STARTUP_KILL_ATTEMPTS,
                    STARTUP_KILL_INTERVAL,
                );
            }
        }

        self.advance(Phase::CheckPrerequisites);
        check_prerequisites(progress)?;

        self.advance(Phase::SelectInstallPath);
        let install_path = self.select_install_path(decisions)?;

        self.advance(Phase::ResolveVersion);
        let (tag, clean) = self.resolve_deploy_target(decisions)?;

        self.advance(Phase::EnsureEnvironment);
        progress.status("Preparing isolated environment ...");
        let handle = self.ensure_environment(&install_path, clean, decisions)?;

        self.advance(Phase::Deploy);
        if let Err(err) = self.deploy(&tag, &handle, progress) {
            warn!(error = %err, "deployment failed");
            if decisions.confirm(
                "The installation could not be completed. Remove the broken install so the next run starts clean?",
            ) {
                self.remove_installation(&install_path)?;
            }
            return Err(err);
        }
        self.config.set(KEY_TAG, tag.label())?;

        self.advance(Phase::SupervisedHandoff);
        if let Some(app) = self.context.companion_app.clone() {
            let handoff = CompanionHandoff::new(app, self.platform);
            if let Err(err) = handoff.run() {
                // Launching without the companion is degraded, not broken.
                warn!(error = %err, "companion handoff skipped");
            }
        }

        self.advance(Phase::Ready);
        Ok(self.launch_plan(&install_path, &handle, &tag))
    }

    /// Confirmed destructive reinstall: environment recreated from scratch,
    /// then a fresh deploy.
    pub fn reinstall(
        &mut self,
        progress: &mut dyn ProgressSink,
        decisions: &mut dyn DecisionSink,
    ) -> Result<()> {
        if !decisions.confirm("Fully reinstall the toolset? The current environment will be recreated.") {
            info!("reinstall declined");
            return Ok(());
        }

        check_prerequisites(progress)?;
        let install_path = self.select_install_path(decisions)?;
        let tag = self.resolve_version(decisions)?;
        progress.status("Recreating isolated environment ...");
        let handle = self.environment.ensure(&install_path, true)?;
        self.deploy(&tag, &handle, progress)?;
        self.config.set(KEY_TAG, tag.label())?;
        Ok(())
    }

    /// Removes the managed installation. With `force` unset, asks first.
    pub fn uninstall(&mut self, decisions: &mut dyn DecisionSink, force: bool) -> Result<()> {
        let install_path = match self
            .context
            .install_path
            .clone()
            .or_else(|| self.config.get(KEY_INSTALL_PATH).map(PathBuf::from))
        {
            Some(path) => path,
            None => {
                warn!("nothing to uninstall: no recorded install path");
                return Ok(());
            }
        };

        if !force
            && !decisions.confirm(&format!(
                "Remove the toolset installation under {}?",
                install_path.display()
            ))
        {
            info!("uninstall declined");
            return Ok(());
        }

        self.remove_installation(&install_path)
    }

    /// Spawns the toolset entry point; does not wait for it.
    pub fn launch(&self, plan: &LaunchPlan) -> Result<()> {
        let script = plan
            .script_path
            .as_ref()
            .ok_or_else(|| anyhow!("no launcher script configured; pass --script-path"))?;
        info!(
            runtime = %plan.runtime_binary.display(),
            script = %script.display(),
            "starting toolset"
        );
        Command::new(&plan.runtime_binary)
            .arg(script)
            .args(&plan.args)
            .spawn()
            .with_context(|| format!("failed to start {}", plan.runtime_binary.display()))?;
        Ok(())
    }

    /// Resolves the release to deploy and whether the environment must be
    /// recreated from scratch. A confirmed move away from the stored version
    /// is persisted right away and deploys into a fresh environment; the
    /// previous version's installed packages do not survive the switch.
    pub(crate) fn resolve_deploy_target(
        &mut self,
        decisions: &mut dyn DecisionSink,
    ) -> Result<(ReleaseTag, bool)> {
        if self.context.dev {
            return Ok((ReleaseTag::dev(), false));
        }

        let stored = self.config.get(KEY_TAG).map(str::to_string);
        let tag = self.resolve_version(decisions)?;
        let switched = stored.as_deref().is_some_and(|label| label != tag.label());
        if switched {
            self.config.set(KEY_TAG, tag.label())?;
        }
        Ok((tag, switched))
    }

    /// Resolves which release to deploy.
    ///
    /// Development mode short-circuits to the `DEV` sentinel with no network
    /// call. An explicit `--tag` that differs from the stored one is a tag
    /// switch and must be confirmed. Otherwise the newest feed entry wins,
    /// with the stored version kept when it is current or the user declines
    /// the update.
    pub(crate) fn resolve_version(&mut self, decisions: &mut dyn DecisionSink) -> Result<ReleaseTag> {
        if self.context.dev {
            debug!("development mode, skipping version resolution");
            return Ok(ReleaseTag::dev());
        }

        if let Some(requested) = self.context.requested_tag.clone() {
            let tag = ReleaseTag::parse(&requested)?;
            if let Some(stored) = self.config.get(KEY_TAG).map(str::to_string) {
                if stored != tag.label()
                    && !decisions.confirm(&format!(
                        "Switch the deployed version from {stored} to {}?",
                        tag.label()
                    ))
                {
                    return ReleaseTag::parse(&stored);
                }
            }
            return Ok(tag);
        }

        let client = http_client()?;
        let catalog = fetch_release_feed(&client, &self.context.repository)?;
        let latest = catalog.latest(self.context.include_prereleases)?;

        if let Some(stored) = self.config.get(KEY_TAG).map(str::to_string) {
            if let Ok(current) = ReleaseTag::parse(&stored) {
                if !current.update_available(&latest) {
                    debug!(tag = %current, "installed version is current");
                    return Ok(current);
                }
                if !decisions.confirm(&format!(
                    "Version {} is available (installed: {}). Update now?",
                    latest.label(),
                    current.label()
                )) {
                    return Ok(current);
                }
            }
        }
        Ok(latest)
    }

    /// Resolves the installation root: explicit flag, then stored config,
    /// then a prompt. A stored path whose directory vanished is cleared.
    pub(crate) fn select_install_path(
        &mut self,
        decisions: &mut dyn DecisionSink,
    ) -> Result<PathBuf> {
        if let Some(path) = self.context.install_path.clone() {
            fs::create_dir_all(&path)
                .with_context(|| format!("failed to create install path: {}", path.display()))?;
            self.config
                .set(KEY_INSTALL_PATH, &path.display().to_string())?;
            return Ok(path);
        }

        if let Some(stored) = self.config.get(KEY_INSTALL_PATH).map(PathBuf::from) {
            if stored.is_dir() {
                debug!(install_path = %stored.display(), "using stored install path");
                return Ok(stored);
            }
            warn!(install_path = %stored.display(), "stored install path no longer exists, clearing");
            self.config.clear(KEY_INSTALL_PATH)?;
        }

        let chosen = decisions
            .choose_install_path("Select an installation directory")
            .ok_or_else(|| anyhow!("installation cancelled: no install path selected"))?;
        fs::create_dir_all(&chosen)
            .with_context(|| format!("failed to create install path: {}", chosen.display()))?;
        self.config
            .set(KEY_INSTALL_PATH, &chosen.display().to_string())?;
        Ok(chosen)
    }

    fn ensure_environment(
        &mut self,
        install_path: &Path,
        mut force: bool,
        decisions: &mut dyn DecisionSink,
    ) -> Result<EnvironmentHandle> {
        if !force && self.environment.is_stale(install_path) {
            if !decisions.confirm(
                "The existing installation looks incomplete. Delete it and install again?",
            ) {
                return Err(anyhow!(
                    "installation aborted: incomplete environment kept at user request"
                ));
            }
            force = true;
        }

        let handle = self.environment.ensure(install_path, force)?;
        if handle.is_valid() {
            return Ok(handle);
        }
        // One recreate attempt before giving up.
        warn!("environment is missing its binaries, recreating");
        let handle = self.environment.ensure(install_path, true)?;
        if !handle.is_valid() {
            return Err(LauncherError::EnvironmentCreationFailed(format!(
                "environment at {} has no usable runtime after recreation",
                handle.root().display()
            ))
            .into());
        }
        Ok(handle)
    }

    fn deploy(
        &mut self,
        tag: &ReleaseTag,
        handle: &EnvironmentHandle,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let mut installer =
            DeploymentInstaller::new()?.with_retry_ceiling(self.context.retry_ceiling);
        if let Some(name) = &self.context.manifest_name {
            installer = installer.with_manifest_name(name.clone());
        }

        if self.context.dev {
            let manifest = self.context.requirements_path.clone().ok_or_else(|| {
                anyhow!("development mode requires --requirements-path to an existing manifest")
            })?;
            return installer.install_only(&manifest, handle, progress);
        }
        installer.deploy(&self.context.repository, tag, handle, progress)
    }

    /// Deletes only the managed environment directory, then the install root
    /// iff nothing else lives there, and clears the stored path. Unrelated
    /// sibling content is never touched.
    pub(crate) fn remove_installation(&mut self, install_path: &Path) -> Result<()> {
        let env_dir = self.environment.env_dir(install_path);
        if env_dir.is_dir() {
            info!(env_dir = %env_dir.display(), "removing installation");
            self.environment.destroy(install_path)?;
        } else {
            warn!(env_dir = %env_dir.display(), "not installed, nothing to remove");
        }

        if install_path.is_dir() {
            let is_empty = fs::read_dir(install_path)
                .with_context(|| format!("failed to read {}", install_path.display()))?
                .next()
                .is_none();
            if is_empty {
                fs::remove_dir(install_path).with_context(|| {
                    format!("failed to remove empty install root: {}", install_path.display())
                })?;
            }
        }

        self.config.clear(KEY_INSTALL_PATH)?;
        Ok(())
    }

    fn launch_plan(
        &self,
        install_path: &Path,
        handle: &EnvironmentHandle,
        tag: &ReleaseTag,
    ) -> LaunchPlan {
        let paths = self.paths_to_register(install_path);
        LaunchPlan {
            runtime_binary: handle.runtime_binary().to_path_buf(),
            script_path: self.context.script_path.clone(),
            args: build_launch_args(
                self.environment.clean_name(),
                install_path,
                &paths,
                tag.label(),
                self.context.config_path.as_deref(),
                self.context.dev,
            ),
        }
    }

    /// Paths the bootstrap script registers on the toolset's module search
    /// path: the install root plus the environment's site-packages when
    /// present.
    fn paths_to_register(&self, install_path: &Path) -> Vec<PathBuf> {
        let mut paths = vec![install_path.to_path_buf()];
        let base = if self.context.dev {
            install_path.to_path_buf()
        } else {
            self.environment.env_dir(install_path)
        };
        if let Some(site_packages) = site_packages_dir(self.platform, &base) {
            paths.push(site_packages);
        }
        paths
    }
}

/// Argument contract of the bootstrap script; registered paths travel as one
/// space-joined value.
pub(crate) fn build_launch_args(
    clean_name: &str,
    install_path: &Path,
    paths_to_register: &[PathBuf],
    tag_label: &str,
    config_path: Option<&Path>,
    dev: bool,
) -> Vec<String> {
    let joined = paths_to_register
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let mut args = vec![
        "--project-name".to_string(),
        clean_name.to_string(),
        "--install-path".to_string(),
        install_path.display().to_string(),
        "--paths-to-register".to_string(),
        joined,
        "--tag".to_string(),
        tag_label.to_string(),
    ];
    if let Some(config) = config_path {
        args.push("--config-path".to_string());
        args.push(config.display().to_string());
    }
    if dev {
        args.push("--dev".to_string());
    }
    args
}
