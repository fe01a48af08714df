use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{info, warn};

use riglauncher_core::{LauncherError, ProgressSink, ReleaseTag, RepositorySlug};
use riglauncher_runtime::EnvironmentHandle;

use crate::download::{download_archive, http_client};
use crate::extract::extract_archive;
use crate::install::install_requirements;
use crate::manifest::locate_manifest;

pub const DEFAULT_RETRY_CEILING: u32 = 10;
pub const DEFAULT_MANIFEST_NAME: &str = "requirements.txt";

/// A staged release: the scratch directory holding the downloaded archive,
/// its unpacked tree, and the manifest discovered inside.
///
/// The scratch directory is removed after a successful install and kept for
/// inspection when the pipeline fails past the download stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPayload {
    pub scratch_dir: PathBuf,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Runs the deployment pipeline for one tagged release: download and unpack
/// with a bounded retry loop, locate the manifest, install its dependencies
/// into the environment.
pub struct DeploymentInstaller {
    client: Client,
    retry_ceiling: u32,
    manifest_name: String,
}

impl DeploymentInstaller {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        })
    }

    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// Full pipeline. On success the scratch directory is gone and the
    /// environment holds the release's dependency set.
    pub fn deploy(
        &self,
        slug: &RepositorySlug,
        tag: &ReleaseTag,
        handle: &EnvironmentHandle,
        sink: &mut dyn ProgressSink,
    ) -> Result<()> {
        let payload = self.stage(slug, tag, sink)?;
        install_requirements(handle.installer_binary(), &payload.manifest_path, sink)?;
        let _ = fs::remove_dir_all(&payload.scratch_dir);
        info!(%slug, tag = %tag, "release deployed");
        Ok(())
    }

    /// Installs an explicit, already-present manifest; the development-mode
    /// path that skips the download entirely.
    pub fn install_only(
        &self,
        manifest_path: &Path,
        handle: &EnvironmentHandle,
        sink: &mut dyn ProgressSink,
    ) -> Result<()> {
        if !manifest_path.is_file() {
            return Err(LauncherError::ManifestNotFound(format!(
                "manifest does not exist: {}",
                manifest_path.display()
            ))
            .into());
        }
        install_requirements(handle.installer_binary(), manifest_path, sink)
    }

    /// Downloads and unpacks the release into a fresh scratch directory and
    /// locates the manifest inside it.
    pub fn stage(
        &self,
        slug: &RepositorySlug,
        tag: &ReleaseTag,
        sink: &mut dyn ProgressSink,
    ) -> Result<DeploymentPayload> {
        let url = slug.archive_url(tag.label());
        let scratch_dir = make_scratch_dir()?;
        let archive_name = url.rsplit('/').next().unwrap_or("release.tar.gz");
        let archive_path = scratch_dir.join(archive_name);

        sink.status("Downloading and unpacking release data ...");
        let payload = {
            let client = &self.client;
            let scratch = scratch_dir.clone();
            self.stage_with_fetcher(&url, &scratch_dir, &archive_path, move |url, archive| {
                download_archive(client, url, archive, sink)?;
                extract_archive(archive, &scratch)
            })
        };
        if payload.is_err() {
            warn!(scratch_dir = %scratch_dir.display(), "staging failed, scratch kept for inspection");
        }
        payload
    }

    /// [`DeploymentInstaller::stage`] with an injectable download+extract
    /// step; the seam the retry tests drive.
    ///
    /// Each attempt runs the fetch step as a unit; the first success moves
    /// on to manifest discovery. A missing manifest is terminal, never
    /// retried: the release genuinely lacks the file.
    pub fn stage_with_fetcher<F>(
        &self,
        url: &str,
        scratch_dir: &Path,
        archive_path: &Path,
        mut fetch: F,
    ) -> Result<DeploymentPayload>
    where
        F: FnMut(&str, &Path) -> Result<()>,
    {
        let mut last_error: Option<anyhow::Error> = None;
        let mut attempts = 0;
        while attempts < self.retry_ceiling {
            attempts += 1;
            match fetch(url, archive_path) {
                Ok(()) => {
                    let manifest_path = locate_manifest(scratch_dir, &self.manifest_name)?;
                    return Ok(DeploymentPayload {
                        scratch_dir: scratch_dir.to_path_buf(),
                        archive_path: archive_path.to_path_buf(),
                        manifest_path,
                    });
                }
                Err(err) => {
                    warn!(attempt = attempts, error = %err, "fetch attempt failed, retrying");
                    last_error = Some(err);
                }
            }
        }

        Err(LauncherError::DownloadFailed {
            attempts,
            reason: last_error
                .map(|err| format!("{err:#}"))
                .unwrap_or_else(|| "retry ceiling is zero".to_string()),
        }
        .into())
    }
}

fn make_scratch_dir() -> Result<PathBuf> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system clock is before the unix epoch")?
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "riglauncher-deploy-{}-{}",
        std::process::id(),
        nanos
    ));
    fs::create_dir_all(&dir).with_context(|| format!("failed creating scratch dir: {}", dir.display()))?;
    Ok(dir)
}
