use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::LauncherError;
use crate::tag::{sanitize_version_label, ReleaseTag};

/// One entry of the remote release feed, newest first in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    /// Sanitized display label; may be a non-semantic string when the raw
    /// label carried no dotted-numeric version.
    pub label: String,
    pub prerelease: bool,
}

/// Ordered, de-duplicated sequence of release entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseCatalog {
    entries: Vec<ReleaseEntry>,
}

#[derive(Debug, Deserialize)]
struct RawFeedEntry {
    #[serde(alias = "tag_name")]
    name: String,
    #[serde(default)]
    prerelease: bool,
}

impl ReleaseCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = ReleaseEntry>) -> Self {
        let mut seen: Vec<ReleaseEntry> = Vec::new();
        for entry in entries {
            if seen.iter().any(|existing| existing.label == entry.label) {
                continue;
            }
            seen.push(entry);
        }
        Self { entries: seen }
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.label.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolves "latest": the first entry in document order that builds a
    /// valid release tag and, unless `include_prerelease` is set, is not a
    /// prerelease. Invalid entries are skipped with a log line, not fatal;
    /// exhausting the catalog is `NoReleasesFound`.
    pub fn latest(&self, include_prerelease: bool) -> Result<ReleaseTag> {
        for entry in &self.entries {
            let tag = match ReleaseTag::parse(&entry.label) {
                Ok(tag) => tag,
                Err(err) => {
                    debug!(label = %entry.label, %err, "skipping unparsable release entry");
                    continue;
                }
            };
            if !include_prerelease && (entry.prerelease || tag.is_prerelease()) {
                debug!(label = %entry.label, "skipping prerelease entry");
                continue;
            }
            return Ok(tag);
        }

        Err(LauncherError::NoReleasesFound(format!(
            "no usable release among {} feed entr{}",
            self.entries.len(),
            if self.entries.len() == 1 { "y" } else { "ies" }
        ))
        .into())
    }
}

/// Parses the body of the release-listing resource into a catalog.
///
/// A structured feed (JSON array of `{name, prerelease}` objects) is tried
/// first; anything else is scanned as HTML for anchors pointing at release
/// tag pages, using the anchor text as the display label.
pub fn parse_release_feed(body: &str) -> ReleaseCatalog {
    if let Ok(raw) = serde_json::from_str::<Vec<RawFeedEntry>>(body) {
        return ReleaseCatalog::from_entries(raw.into_iter().map(|entry| ReleaseEntry {
            label: sanitize_version_label(&entry.name),
            prerelease: entry.prerelease,
        }));
    }

    let entries = release_anchor_pattern()
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .map(|anchor| strip_markup(anchor.as_str()))
        .filter(|text| !text.is_empty())
        .map(|text| {
            let label = sanitize_version_label(&text);
            let prerelease = ReleaseTag::parse(&label)
                .map(|tag| tag.is_prerelease())
                .unwrap_or(false);
            ReleaseEntry { label, prerelease }
        });
    ReleaseCatalog::from_entries(entries)
}

fn release_anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*href="[^"]*/releases/tag/[^"]*"[^>]*>(.*?)</a>"#)
            .expect("release anchor pattern must compile")
    })
}

fn strip_markup(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}
