use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::home_dir;
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

/// Setting this to `true` forces silent notifications (used by the Summon provider).
pub const SILENT_ENV: &str = "LOCKSMITH_SILENT";

/// User-level configuration loaded from `~/.locksmith/config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Override for the encrypted cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// How far ahead of expiry a secret counts as expiring, e.g. `7d`.
    pub expiring_threshold: String,
    pub method: NotificationMethod,
    pub show_on_get: bool,
    pub show_on_list: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            expiring_threshold: "7d".to_string(),
            method: NotificationMethod::Stderr,
            show_on_get: true,
            show_on_list: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationMethod {
    Stderr,
    #[serde(alias = "macos")]
    NativeNotification,
    Silent,
}

impl Config {
    /// Parsed `expiring_threshold`.
    pub fn expiring_threshold(&self) -> Result<chrono::Duration> {
        let threshold = parse_duration(&self.notifications.expiring_threshold)?;
        Ok(chrono::Duration::from_std(threshold)?)
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(self, silent: Option<&str>) -> Self {
        let mut cfg = self;
        if silent == Some("true") {
            cfg.notifications.method = NotificationMethod::Silent;
        }
        cfg
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let cfg = load_from_path(default_path()?)?;
    Ok(cfg.with_env_overrides(std::env::var(SILENT_ENV).ok().as_deref()))
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Base directory for Locksmith state (`~/.locksmith`).
pub fn base_dir() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| color_eyre::eyre::eyre!("no home dir available"))?;
    Ok(home.join(".locksmith"))
}

pub fn default_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("config.toml"))
}

/// Write the given config to `path` unless a file is already there.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
