use std::process::Command;

use anyhow::Result;
use tracing::{info, warn};

use riglauncher_core::{LauncherError, ProgressSink};

use crate::command::{command_succeeds, run_command};

const INTERPRETER: &str = "python";
const PACKAGE_MANAGER: &str = "pip";
const ENV_TOOL: &str = "virtualenv";

/// Outcome of the host prerequisite checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerequisiteReport {
    pub interpreter: bool,
    pub package_manager: bool,
    pub env_tool: bool,
    /// True when the environment tool was absent and installed during the
    /// check.
    pub env_tool_installed_now: bool,
}

/// Verifies the base interpreter, its package manager, and the environment
/// creation tool, installing the latter when missing.
///
/// A missing interpreter or package manager is fatal for the run; a missing
/// environment tool is only fatal when the automatic install fails too.
pub fn check_prerequisites(sink: &mut dyn ProgressSink) -> Result<PrerequisiteReport> {
    check_prerequisites_with_probes(sink, command_succeeds, || {
        run_command(
            Command::new(PACKAGE_MANAGER).args(["install", ENV_TOOL]),
            "failed to install environment tool",
        )
        .is_ok()
    })
}

pub(crate) fn check_prerequisites_with_probes<P, I>(
    sink: &mut dyn ProgressSink,
    probe: P,
    mut install_env_tool: I,
) -> Result<PrerequisiteReport>
where
    P: Fn(&str, &[&str]) -> bool,
    I: FnMut() -> bool,
{
    sink.status("Checking if the base interpreter is installed ...");
    if !probe(INTERPRETER, &["-c", "quit()"]) {
        return Err(LauncherError::PrerequisiteMissing(format!(
            "no {INTERPRETER} installation found on this host"
        ))
        .into());
    }

    sink.status("Checking if the package manager is installed ...");
    if !probe(PACKAGE_MANAGER, &["-V"]) {
        return Err(LauncherError::PrerequisiteMissing(format!(
            "no {PACKAGE_MANAGER} installation found on this host"
        ))
        .into());
    }

    sink.status("Checking if the environment tool is installed ...");
    let mut env_tool_installed_now = false;
    if !probe(ENV_TOOL, &["--version"]) {
        warn!("no {ENV_TOOL} installation found, installing");
        sink.status("Installing environment tool ...");
        if !install_env_tool() || !probe(ENV_TOOL, &["--version"]) {
            return Err(LauncherError::PrerequisiteMissing(format!(
                "could not install {ENV_TOOL} with {PACKAGE_MANAGER}"
            ))
            .into());
        }
        info!("{ENV_TOOL} installed successfully");
        env_tool_installed_now = true;
    }

    Ok(PrerequisiteReport {
        interpreter: true,
        package_manager: true,
        env_tool: true,
        env_tool_installed_now,
    })
}
