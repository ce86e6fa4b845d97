use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::{ManagerError, Result};

/// Settings shared by the setup wizard and the control panel.
#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub service: ServiceConfig,
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct GeneralConfig {
    #[default = "info"]
    pub log_level: String,
    /// Control panel refresh interval.
    #[default = 5]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ServiceConfig {
    #[default = "beszelagent"]
    pub name: String,
    #[default = 45876]
    pub agent_port: u16,
    #[default = "Beszel Agent"]
    pub firewall_rule: String,
    #[default(default_install_dir())]
    pub install_dir: PathBuf,
    #[default(PathBuf::from(r"C:\ProgramData\chocolatey\bin\nssm.exe"))]
    pub nssm_path: PathBuf,
    #[default(PathBuf::from(r"C:\ProgramData\chocolatey\bin"))]
    pub choco_bin_dir: PathBuf,
    /// How long to wait after `sc start` before checking the status.
    #[default = 2]
    pub start_wait_secs: u64,
    /// Pause after installing Chocolatey before it is used.
    #[default = 3]
    pub prereq_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ReleaseConfig {
    #[default = "https://api.github.com/repos/henrygd/beszel/releases/latest"]
    pub api_url: String,
    #[default = "beszel-agent_windows_amd64.zip"]
    pub asset_token: String,
    #[default = 5]
    pub check_timeout_secs: u64,
    #[default = 300]
    pub download_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn start_wait(&self) -> Duration {
        Duration::from_secs(self.start_wait_secs)
    }

    pub fn prereq_wait(&self) -> Duration {
        Duration::from_secs(self.prereq_wait_secs)
    }
}

impl ReleaseConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// `%ProgramW6432%\beszel-agent`, falling back to `%ProgramFiles%` and
/// finally `C:\Program Files`.
pub fn default_install_dir() -> PathBuf {
    let program_files = ["ProgramW6432", "ProgramFiles"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(PathBuf::from)
        .find(|dir| dir.exists())
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
    program_files.join(super::AGENT_DIR_NAME)
}

pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;
    load_from(&config_path)
}

/// Reads `path`, writing the defaults there first when it does not exist.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!("Config file not found, creating default config");
        let default_config = Config::default();
        save_to(&default_config, path)?;
        return Ok(default_config);
    }

    let config_data = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&config_data)?;

    Ok(config)
}

/// Like [`load`], but never fails: problems are logged and defaults used.
pub fn load_or_default() -> Config {
    match load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}", e);
            info!("Using default configuration");
            Config::default()
        }
    }
}

pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    // Ensure directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_json = serde_json::to_string_pretty(config)?;
    fs::write(path, config_json)?;

    Ok(())
}

fn get_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "beszel", "agent-manager").ok_or_else(|| {
        ManagerError::Config("could not determine config directory".to_string())
    })?;

    Ok(dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_agent_constants() {
        let config = Config::default();
        assert_eq!(config.service.name, "beszelagent");
        assert_eq!(config.service.agent_port, 45876);
        assert_eq!(config.service.firewall_rule, "Beszel Agent");
        assert_eq!(config.release.asset_token, "beszel-agent_windows_amd64.zip");
        assert_eq!(config.release.check_timeout(), Duration::from_secs(5));
        assert_eq!(config.general.refresh_interval_secs, 5);
        assert!(config.service.install_dir.ends_with("beszel-agent"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.service.name, "beszelagent");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"service": {"agent_port": 9000}}"#).unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.service.agent_port, 9000);
        assert_eq!(config.service.name, "beszelagent");
        assert_eq!(config.release.download_timeout_secs, 300);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_from(&path), Err(ManagerError::Json(_))));
    }
}
