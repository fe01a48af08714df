//! Deployment installer: fetches a tagged release archive, unpacks it into a
//! scratch directory, finds the dependency manifest inside, and installs the
//! dependencies into an isolated runtime environment.

mod deploy;
mod download;
mod extract;
mod install;
mod manifest;

pub use deploy::{
    DeploymentInstaller, DeploymentPayload, DEFAULT_MANIFEST_NAME, DEFAULT_RETRY_CEILING,
};
pub use download::{download_archive, fetch_release_feed, http_client};
pub use extract::{extract_archive, ArchiveKind};
pub use install::install_requirements;
pub use manifest::locate_manifest;

#[cfg(test)]
mod tests;
