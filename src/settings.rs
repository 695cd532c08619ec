//! Settings for ghostctl itself.
//!
//! This module defines the structure of the optional `ghostctl.toml` file in
//! the ghostctl home directory and resolves where that directory lives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "ghostctl.toml";
pub const HOME_ENV: &str = "GHOSTCTL_HOME";
pub const ROOT_ENV: &str = "GHOSTCTL_ROOT";

const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_START_GRACE_MS: u64 = 500;
const DEFAULT_PACKAGE_MANAGER: &str = "yarn";

/// Top-level structure of `ghostctl.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub process: ProcessSettings,
    #[serde(default)]
    pub package_manager: PackageManagerSettings,
}

/// Tuning for the local process manager.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessSettings {
    /// Time to wait after SIGTERM before force-killing (ms).
    pub stop_timeout_ms: Option<u64>,
    /// How long a freshly spawned process must survive to count as started (ms).
    pub start_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManagerSettings {
    /// Executable name or path (default: yarn).
    pub program: Option<String>,
}

impl Settings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(
            self.process
                .stop_timeout_ms
                .unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
        )
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(
            self.process
                .start_grace_ms
                .unwrap_or(DEFAULT_START_GRACE_MS),
        )
    }

    pub fn package_manager(&self) -> &str {
        self.package_manager
            .program
            .as_deref()
            .unwrap_or(DEFAULT_PACKAGE_MANAGER)
    }
}

/// Loads `ghostctl.toml` from `home`, falling back to defaults when absent.
pub fn load_settings(home: &Path) -> Result<Settings> {
    let path = home.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

/// Directory holding `ghostctl.toml` and the system state file.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(HOME_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("ghostctl"))
        .context("could not determine a config directory; set GHOSTCTL_HOME")
}

/// Install root of ghostctl, used as the package manager's local directory.
pub fn install_root() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(ROOT_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe().context("failed to locate the ghostctl executable")?;
    // <root>/bin/ghostctl
    let root = exe
        .parent()
        .and_then(Path::parent)
        .context("ghostctl executable has no install root")?;
    Ok(root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let raw = r#"
[process]
stop_timeout_ms = 2500
start_grace_ms = 100

[package_manager]
program = "npm"
"#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.stop_timeout(), Duration::from_millis(2500));
        assert_eq!(settings.start_grace(), Duration::from_millis(100));
        assert_eq!(settings.package_manager(), "npm");
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.stop_timeout(), Duration::from_secs(10));
        assert_eq!(settings.start_grace(), Duration::from_millis(500));
        assert_eq!(settings.package_manager(), "yarn");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.package_manager(), "yarn");
    }
}
