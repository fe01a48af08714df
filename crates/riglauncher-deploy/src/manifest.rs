use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use riglauncher_core::LauncherError;

/// Finds the first file named `manifest_name` under `root`, depth-first with
/// each directory's own files checked before its subdirectories.
pub fn locate_manifest(root: &Path, manifest_name: &str) -> Result<PathBuf> {
    match find_manifest(root, manifest_name)? {
        Some(path) => {
            debug!(manifest = %path.display(), "manifest located");
            Ok(path)
        }
        None => Err(LauncherError::ManifestNotFound(format!(
            "no file named {} under {}",
            manifest_name,
            root.display()
        ))
        .into()),
    }
}

fn find_manifest(dir: &Path, manifest_name: &str) -> Result<Option<PathBuf>> {
    let mut subdirs = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed reading entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name() == manifest_name {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_manifest(&subdir, manifest_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
