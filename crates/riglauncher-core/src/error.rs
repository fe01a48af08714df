use thiserror::Error;

/// Failure taxonomy for the update-and-provisioning pipeline.
///
/// Every variant carries the underlying cause text verbatim so that fatal
/// errors surfaced to the user are detailed enough for a support report.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("invalid version '{label}': {reason}")]
    InvalidVersion { label: String, reason: String },

    #[error("release feed unreachable: {0}")]
    FeedUnreachable(String),

    #[error("no releases found: {0}")]
    NoReleasesFound(String),

    #[error("environment creation failed: {0}")]
    EnvironmentCreationFailed(String),

    #[error("download failed after {attempts} attempt(s): {reason}")]
    DownloadFailed { attempts: u32, reason: String },

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("manifest '{0}' not found in deployment payload")]
    ManifestNotFound(String),

    #[error("dependency install failed: {0}")]
    InstallFailed(String),

    // Non-fatal by contract: callers log this and continue.
    #[error("companion handoff skipped: {0}")]
    HandoffSkipped(String),

    #[error("config write failed: {0}")]
    ConfigWriteFailed(String),
}

impl LauncherError {
    pub fn invalid_version(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            label: label.into(),
            reason: reason.into(),
        }
    }
}
