use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info};

use riglauncher_core::LauncherError;
use riglauncher_runtime::{kill_matching, HostPlatform};

/// Companion application handoff: close any running copies of the companion
/// executable, then start a fresh instance so the launched toolset attaches
/// to a clean one.
pub struct CompanionHandoff {
    executable: String,
    platform: HostPlatform,
}

impl CompanionHandoff {
    pub fn new(executable: impl Into<String>, platform: HostPlatform) -> Self {
        Self {
            executable: executable.into(),
            platform,
        }
    }

    /// Per-user data directory of the companion app, by platform convention.
    fn data_dir(&self) -> Option<PathBuf> {
        match self.platform {
            HostPlatform::Windows => std::env::var("LOCALAPPDATA")
                .ok()
                .map(|base| PathBuf::from(base).join(&self.executable)),
            HostPlatform::MacOs => std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join(&self.executable)
            }),
            HostPlatform::Linux => std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join(&self.executable)
            }),
        }
    }

    /// Candidate executable locations beneath the data dir: the dir itself,
    /// then versioned subdirectories newest-named first.
    pub fn discovery_paths(&self) -> Vec<PathBuf> {
        let Some(dir) = self.data_dir() else {
            return Vec::new();
        };
        let binary = self.platform.executable(&self.executable);
        let mut candidates = vec![dir.join(&binary)];
        if let Ok(entries) = fs::read_dir(&dir) {
            let mut subdirs: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            subdirs.sort();
            subdirs.reverse();
            candidates.extend(subdirs.into_iter().map(|sub| sub.join(&binary)));
        }
        candidates
    }

    /// Kills running instances and spawns the companion executable without
    /// waiting on it. A missing executable is [`LauncherError::HandoffSkipped`];
    /// callers log it and carry on.
    pub fn run(&self) -> Result<PathBuf> {
        let prefix = self.executable.clone();
        let killed = kill_matching(|name| name.starts_with(prefix.as_str()));
        if killed > 0 {
            debug!(killed, "closed running companion instances");
        }

        let candidates = self.discovery_paths();
        let Some(binary) = candidates.iter().find(|path| path.is_file()) else {
            return Err(LauncherError::HandoffSkipped(format!(
                "companion executable '{}' not found under its data directory",
                self.executable
            ))
            .into());
        };

        Command::new(binary)
            .spawn()
            .with_context(|| format!("failed to start companion app: {}", binary.display()))?;
        info!(binary = %binary.display(), "companion application started");
        Ok(binary.clone())
    }
}
