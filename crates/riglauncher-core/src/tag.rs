use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use semver::Version;

use crate::error::LauncherError;

/// Sentinel label selected when the launcher runs in development mode.
pub const DEV_LABEL: &str = "DEV";

/// A resolved release identifier: either a validated semantic version with
/// its canonical sanitized label, or the `DEV` sentinel.
///
/// Immutable once constructed; the only way in is [`ReleaseTag::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseTag {
    Dev,
    Release { label: String, version: Version },
}

impl ReleaseTag {
    pub fn dev() -> Self {
        Self::Dev
    }

    /// Parses a display label into a release tag.
    ///
    /// The label is sanitized first (see [`sanitize_version_label`]); the
    /// sanitized form must then build a valid semantic version. Labels that
    /// survive sanitization but are not versions (e.g. `vNext`) are rejected
    /// with `InvalidVersion`, never silently coerced.
    pub fn parse(label: &str) -> Result<Self> {
        let trimmed = label.trim();
        if trimmed == DEV_LABEL {
            return Ok(Self::Dev);
        }

        let sanitized = sanitize_version_label(trimmed);
        let version = version_from_sanitized(&sanitized)
            .ok_or_else(|| LauncherError::invalid_version(trimmed, "not a semantic version"))?;
        Ok(Self::Release {
            label: sanitized,
            version,
        })
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prerelease(&self) -> bool {
        match self {
            Self::Dev => false,
            Self::Release { version, .. } => !version.pre.is_empty(),
        }
    }

    /// Canonical label: the sanitized version string, or `DEV`.
    pub fn label(&self) -> &str {
        match self {
            Self::Dev => DEV_LABEL,
            Self::Release { label, .. } => label,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Dev => None,
            Self::Release { version, .. } => Some(version),
        }
    }

    /// Whether `candidate` is a strict upgrade over `self`.
    ///
    /// The decision to act on it belongs to the caller; this only compares.
    /// `DEV` never participates in update checks.
    pub fn update_available(&self, candidate: &ReleaseTag) -> bool {
        match (self.version(), candidate.version()) {
            (Some(current), Some(next)) => next > current,
            _ => false,
        }
    }
}

impl Ord for ReleaseTag {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Dev, Self::Dev) => Ordering::Equal,
            // The development sentinel outranks any published release.
            (Self::Dev, Self::Release { .. }) => Ordering::Greater,
            (Self::Release { .. }, Self::Dev) => Ordering::Less,
            (Self::Release { version: a, .. }, Self::Release { version: b, .. }) => a.cmp(b),
        }
    }
}

impl PartialOrd for ReleaseTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([0-9]+(?:\.[0-9]+)+)-?(rc[0-9]*)?").expect("version pattern must compile")
    })
}

/// Extracts what appears to be the version information from a display label.
///
/// The first substring matching the dotted-numeric grammar
/// `\d+(\.\d+)+(rc\d*)?` wins; an `rc` suffix is normalized onto the numeric
/// part without a separating hyphen (`v3.0.0-rc1` becomes `3.0.0rc1`). When
/// nothing matches, the trimmed raw label is returned as a fallback and
/// callers must expect a non-semantic string.
pub fn sanitize_version_label(label: &str) -> String {
    match version_pattern().captures(label) {
        Some(captures) => {
            let numeric = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let rc = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            format!("{numeric}{rc}")
        }
        None => label.trim().to_string(),
    }
}

/// Builds a semantic version from a sanitized label, mapping a trailing
/// `rcN` marker to a semver prerelease identifier.
fn version_from_sanitized(sanitized: &str) -> Option<Version> {
    let (numeric, prerelease) = match sanitized.find("rc") {
        Some(index) => (&sanitized[..index], Some(&sanitized[index..])),
        None => (sanitized, None),
    };

    let components: Vec<&str> = numeric.split('.').collect();
    if components.is_empty() || components.len() > 3 {
        return None;
    }
    if components.iter().any(|part| {
        part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit())
    }) {
        return None;
    }

    let mut padded = components
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>();
    while padded.len() < 3 {
        padded.push("0".to_string());
    }

    let candidate = match prerelease {
        Some(rc) => format!("{}-{rc}", padded.join(".")),
        None => padded.join("."),
    };
    Version::parse(&candidate).ok()
}
