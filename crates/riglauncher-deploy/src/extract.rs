use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use riglauncher_core::LauncherError;
use riglauncher_runtime::run_command;

/// Archive container, inferred from the file name. Anything without a
/// recognized tar suffix is treated as a zip container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
    Zip,
}

impl ArchiveKind {
    pub fn infer(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if lower.ends_with(".tar") {
            ArchiveKind::Tar
        } else {
            ArchiveKind::Zip
        }
    }
}

/// Unpacks an archive into `destination`, creating it first. Failures come
/// back as [`LauncherError::ExtractionFailed`] so the caller's retry loop
/// can treat them like a failed download.
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;

    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = ArchiveKind::infer(&file_name);
    debug!(archive = %archive.display(), ?kind, "extracting archive");

    let result = match kind {
        ArchiveKind::TarGz => run_command(
            Command::new("tar")
                .arg("-xzf")
                .arg(archive)
                .arg("-C")
                .arg(destination),
            "failed to extract gzipped tar archive",
        ),
        ArchiveKind::Tar => run_command(
            Command::new("tar")
                .arg("-xf")
                .arg(archive)
                .arg("-C")
                .arg(destination),
            "failed to extract tar archive",
        ),
        ArchiveKind::Zip => extract_zip(archive, destination),
    };

    result.map_err(|err| {
        LauncherError::ExtractionFailed(format!("{}: {err:#}", archive.display())).into()
    })
}

fn extract_zip(archive: &Path, destination: &Path) -> Result<()> {
    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote(archive),
            escape_ps_single_quote(destination)
        ));
        if run_command(&mut command, "failed to extract zip archive with powershell").is_ok() {
            return Ok(());
        }
    }

    let mut unzip_command = Command::new("unzip");
    unzip_command
        .arg("-q")
        .arg(archive)
        .arg("-d")
        .arg(destination);
    if run_command(&mut unzip_command, "failed to extract zip archive with unzip").is_ok() {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(destination),
        "failed to extract zip archive with tar fallback",
    )
}

fn escape_ps_single_quote(path: &Path) -> String {
    let mut os = OsString::new();
    os.push(path.as_os_str());
    os.to_string_lossy().replace('\'', "''")
}
