use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

const APP_DIR: &str = "comreq";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub output: OutputConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub pretty: bool,
    /// Print notifications even when the user's snapshot is empty.
    pub show_empty: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// User applied to commands that do not name one.
    pub default_user: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl AppConfig {
    /// `<config_dir>/comreq/config.json`, creating the directory if needed.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        let app_config_dir = config_dir.join(APP_DIR);
        std::fs::create_dir_all(&app_config_dir)?;
        Ok(app_config_dir.join(CONFIG_FILE))
    }

    /// Loads the default config file, falling back to defaults when it is
    /// missing or unreadable. Defaults are written out only when no file exists.
    pub fn load() -> Self {
        let path = match Self::config_file_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "cannot locate config file, using defaults");
                return Self::default();
            }
        };
        Self::load_or_default(&path)
    }

    /// Same as [`AppConfig::load`] for an explicit path.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, writing defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save_to(path) {
                    warn!(
                        error = %save_err,
                        path = %path.display(),
                        "failed to save default config"
                    );
                }
                default_config
            }
            // an existing but broken file is left untouched
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Reads a config file. If the main file is corrupted, the `.json.tmp`
    /// sibling left by an interrupted save is tried before giving up.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to parse config, trying tmp fallback"
                );
                let tmp = path.with_extension("json.tmp");
                match std::fs::read(&tmp) {
                    Ok(tmp_bytes) => Ok(serde_json::from_slice(&tmp_bytes)?),
                    Err(_) => Err(ConfigError::Parse(e)),
                }
            }
        }
    }

    /// Atomic write: serialize to `<path>.tmp`, then rename over the target.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
