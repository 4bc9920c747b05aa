//! Configuration Management
//!
//! Loads endpoint and tuning settings from `vcenterconfig.json` (or a YAML
//! equivalent). Command line flags take precedence over the file.

use crate::lifecycle::ControllerOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vcenterconfig.json";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Endpoint host name, address, or URL
    #[serde(default)]
    pub vcenter_host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub snapshot_name: Option<String>,
    #[serde(default)]
    pub snapshot_description: Option<String>,
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl Config {
    /// Fallback location in the user's config directory
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vmctl").join("config.json"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `vcenterconfig.json` in the
    /// working directory is tried, then the user config directory, then
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_from(&local);
        }

        match Self::user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a JSON or YAML file (by extension)
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
        };

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get effective host (CLI > config)
    pub fn effective_host(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.vcenter_host.clone())
            .filter(|h| !h.trim().is_empty())
    }

    /// Get effective user (CLI > config)
    pub fn effective_user(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.username.clone())
            .filter(|u| !u.trim().is_empty())
    }

    /// Controller tuning with config overrides applied
    pub fn controller_options(&self) -> ControllerOptions {
        let mut options = ControllerOptions::default();
        if let Some(secs) = self.task_timeout_secs {
            options.task_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = self.poll_interval_ms {
            options.poll_interval = Duration::from_millis(ms.max(10));
        }
        if let Some(name) = &self.snapshot_name {
            options.snapshot_name = name.clone();
        }
        if let Some(description) = &self.snapshot_description {
            options.snapshot_description = description.clone();
        }
        options
    }
}
