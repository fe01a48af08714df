mod command;
mod platform;
mod prereq;
mod process;
mod venv;

pub use command::{command_succeeds, run_command, run_command_capture};
pub use platform::{clean_project_name, HostPlatform};
pub use prereq::{check_prerequisites, PrerequisiteReport};
pub use process::{kill_matching, parse_process_list, wait_until_gone, ProcessEntry};
pub use venv::{site_packages_dir, EnvironmentHandle, RuntimeEnvironment};
