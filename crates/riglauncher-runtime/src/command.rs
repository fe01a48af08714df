use std::process::{Command, Output};

use anyhow::{anyhow, Context, Result};

/// Runs a command to completion, failing on non-zero exit with the captured
/// output folded into the error text.
pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = run_command_capture(command, context_message)?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

/// Runs a command to completion and returns the raw output regardless of
/// exit status; only failure to start is an error.
pub fn run_command_capture(command: &mut Command, context_message: &str) -> Result<Output> {
    command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))
}

/// Whether a tool runs and exits cleanly; used for prerequisite probes.
pub fn command_succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
