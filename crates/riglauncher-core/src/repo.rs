use anyhow::{anyhow, Result};

/// Identifier of the deployment repository, `owner/name`.
///
/// The release-listing and archive-download URLs are siblings derived
/// deterministically from this slug; nothing else about the hosting forge is
/// assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySlug {
    owner: String,
    name: String,
}

const FORGE_BASE: &str = "https://github.com";

impl RepositorySlug {
    /// Accepts `owner/name` or a full repository URL ending in that pair.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_end_matches('/');
        let stripped = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .unwrap_or(trimmed);

        let mut parts = stripped.split('/');
        let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(anyhow!(
                "invalid repository identifier '{input}': expected owner/name"
            ));
        };
        if owner.is_empty() || name.is_empty() {
            return Err(anyhow!(
                "invalid repository identifier '{input}': expected owner/name"
            ));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// The "browse releases" page, used only for catalog resolution.
    pub fn releases_url(&self) -> String {
        format!("{FORGE_BASE}/{}/{}/releases", self.owner, self.name)
    }

    /// Page describing one published tag.
    pub fn tag_url(&self, label: &str) -> String {
        format!(
            "{FORGE_BASE}/{}/{}/releases/tag/{label}",
            self.owner, self.name
        )
    }

    /// Archive-download convention for a selected tag.
    pub fn archive_url(&self, label: &str) -> String {
        format!(
            "{FORGE_BASE}/{}/{}/archive/{label}.tar.gz",
            self.owner, self.name
        )
    }
}

impl std::fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
