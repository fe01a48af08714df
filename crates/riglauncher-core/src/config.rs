use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::LauncherError;

pub const KEY_INSTALL_PATH: &str = "install_path";
pub const KEY_TAG: &str = "tag";

/// Flat string-to-string record persisted as one JSON object at a fixed
/// per-user path.
///
/// Every mutation rewrites the whole file; last writer wins. There is no
/// concurrent-writer protection, so the orchestrator owns the single handle
/// and serializes its own writes.
#[derive(Debug, Clone)]
pub struct ConfigRecord {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigRecord {
    /// Loads the record, creating an empty file when absent.
    ///
    /// A corrupt file is treated as empty rather than fatal; the next write
    /// replaces it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(values) => values,
                Err(err) => {
                    warn!(path = %path.display(), %err, "config file unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "creating config file");
                let record = Self {
                    path: path.clone(),
                    values: BTreeMap::new(),
                };
                record.persist()?;
                return Ok(record);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }

    /// Clears a key by writing an empty value, the record's tombstone form.
    pub fn clear(&mut self, key: &str) -> Result<()> {
        self.values.insert(key.to_string(), String::new());
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                LauncherError::ConfigWriteFailed(format!(
                    "failed to create {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let serialized =
            serde_json::to_string_pretty(&self.values).context("failed to serialize config")?;
        fs::write(&self.path, serialized).map_err(|err| {
            LauncherError::ConfigWriteFailed(format!(
                "failed to write {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

/// Fixed per-user config path for a project, by platform convention.
pub fn default_user_config_path(clean_project_name: &str) -> Result<PathBuf> {
    let file_name = format!("{clean_project_name}_launcher.cfg");
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows config path")?;
        return Ok(PathBuf::from(app_data)
            .join(clean_project_name)
            .join(file_name));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve config path")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join(clean_project_name)
        .join(file_name))
}
