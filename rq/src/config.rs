//! rpcqueue configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::QueueOptions;

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = ".rpcqueue.yml";

/// Main rpcqueue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Queue admission options
    pub queue: QueueOptions,
}

impl Config {
    /// Check queue options the same way the scheduler will, applying coercions
    pub fn validate(mut self) -> Result<Self> {
        self.queue = self.queue.validated()?;
        Ok(self)
    }

    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.rpcqueue.yml`, then the user config dir, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for path in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Fallback files tried in order when no explicit path is given
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("rpcqueue").join("rpcqueue.yml"));
        }
        paths
    }

    /// Read the log level only, from the same file `load` would pick
    ///
    /// Used before logging is set up, so failures are silent.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        match config_path {
            Some(path) => Self::read_log_level(path).flatten(),
            None => Self::candidate_paths()
                .iter()
                .filter(|path| path.exists())
                .find_map(|path| Self::read_log_level(path))
                .flatten(),
        }
    }

    /// `None` when the file can't be read as YAML, `Some(None)` when it has no log level
    fn read_log_level(path: &Path) -> Option<Option<String>> {
        let content = fs::read_to_string(path).ok()?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
        Some(value.get("log-level").and_then(|v| v.as_str()).map(str::to_string))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        let config = config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Render as YAML, e.g. for `rq config`
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}
