use anyhow::{anyhow, Result};

/// Host platform family, as far as environment layout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    MacOs,
    Linux,
}

impl HostPlatform {
    /// Detects the running platform; anything else is a hard error.
    pub fn current() -> Result<Self> {
        if cfg!(target_os = "windows") {
            Ok(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Ok(Self::MacOs)
        } else if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else {
            Err(anyhow!(
                "unsupported host platform: {}",
                std::env::consts::OS
            ))
        }
    }

    /// Subdirectory of an isolated environment holding its executables.
    pub fn scripts_dir(self) -> &'static str {
        match self {
            Self::Windows => "Scripts",
            Self::MacOs | Self::Linux => "bin",
        }
    }

    /// Executable file name for a tool base name.
    pub fn executable(self, base: &str) -> String {
        match self {
            Self::Windows => format!("{base}.exe"),
            Self::MacOs | Self::Linux => base.to_string(),
        }
    }

    /// Subfolders a healthy isolated environment is expected to contain;
    /// used for stale-installation detection.
    pub fn expected_env_subdirs(self) -> [&'static str; 3] {
        match self {
            Self::Windows => ["Include", "Lib", "Scripts"],
            Self::MacOs | Self::Linux => ["include", "lib", "bin"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "MacOS",
            Self::Linux => "Linux",
        }
    }
}

/// Project name without spaces and lowercased, used for directory and
/// process-name conventions.
pub fn clean_project_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
