use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::command::run_command_capture;
use crate::platform::HostPlatform;

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Parses the platform process lister's output.
///
/// Windows: `tasklist /fo csv /nh` rows (`"name","pid",...`).
/// Unix: `ps -eo pid=,comm=` rows (`  pid name`).
pub fn parse_process_list(platform: HostPlatform, raw: &str) -> Vec<ProcessEntry> {
    match platform {
        HostPlatform::Windows => raw.lines().filter_map(parse_tasklist_row).collect(),
        HostPlatform::MacOs | HostPlatform::Linux => {
            raw.lines().filter_map(parse_ps_row).collect()
        }
    }
}

fn parse_tasklist_row(line: &str) -> Option<ProcessEntry> {
    let mut fields = line.split("\",\"");
    let name = fields.next()?.trim_start_matches('"').trim();
    let pid = fields.next()?.trim_end_matches('"').trim().parse().ok()?;
    if name.is_empty() {
        return None;
    }
    Some(ProcessEntry {
        pid,
        name: name.to_string(),
    })
}

fn parse_ps_row(line: &str) -> Option<ProcessEntry> {
    let trimmed = line.trim();
    let (pid_str, name) = trimmed.split_once(char::is_whitespace)?;
    let pid = pid_str.parse().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ProcessEntry {
        pid,
        name: name.to_string(),
    })
}

fn list_processes() -> Result<Vec<ProcessEntry>> {
    let platform = HostPlatform::current()?;
    let output = match platform {
        HostPlatform::Windows => run_command_capture(
            Command::new("tasklist").args(["/fo", "csv", "/nh"]),
            "failed to list processes",
        )?,
        HostPlatform::MacOs | HostPlatform::Linux => run_command_capture(
            Command::new("ps").args(["-eo", "pid=,comm="]),
            "failed to list processes",
        )?,
    };

    Ok(parse_process_list(
        platform,
        &String::from_utf8_lossy(&output.stdout),
    ))
}

/// Forcefully terminates every process whose name matches the predicate,
/// excluding the current process. Returns the number of processes a
/// terminate signal was delivered to.
///
/// Termination is best effort: a process that cannot be listed or killed is
/// logged and skipped, never fatal.
pub fn kill_matching<F>(predicate: F) -> usize
where
    F: Fn(&str) -> bool,
{
    let own_pid = std::process::id();
    let entries = match list_processes() {
        Ok(entries) => entries,
        Err(err) => {
            warn!(%err, "process enumeration failed, skipping kill pass");
            return 0;
        }
    };

    let mut terminated = 0;
    for entry in entries {
        if entry.pid == own_pid || !predicate(&entry.name) {
            continue;
        }
        debug!(pid = entry.pid, name = %entry.name, "terminating process");
        if terminate(entry.pid) {
            terminated += 1;
        } else {
            warn!(pid = entry.pid, name = %entry.name, "failed to terminate process");
        }
    }
    terminated
}

fn terminate(pid: u32) -> bool {
    let result = if cfg!(windows) {
        Command::new("taskkill")
            .args(["/f", "/pid", &pid.to_string()])
            .output()
    } else {
        Command::new("kill").args(["-9", &pid.to_string()]).output()
    };
    result.map(|output| output.status.success()).unwrap_or(false)
}

/// Polls the process table until nothing matches the predicate or the
/// attempt budget is spent. Returns true when the table is clear.
///
/// Kill delivery does not wait for file handles to be released; callers run
/// this before filesystem operations that assume the handles are gone.
pub fn wait_until_gone<F>(predicate: F, attempts: u32, interval: Duration) -> bool
where
    F: Fn(&str) -> bool,
{
    let own_pid = std::process::id();
    for attempt in 0..attempts {
        let survivors = list_processes()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.pid != own_pid && predicate(&entry.name))
                    .count()
            })
            .unwrap_or(0);
        if survivors == 0 {
            return true;
        }
        debug!(attempt, survivors, "waiting for terminated processes to exit");
        thread::sleep(interval);
    }
    false
}
