//! Configuration handling for hubmigrate
//!
//! Configuration is read from `--config <path>` or
//! `~/.config/hubmigrate/config.toml` (platform equivalent). Command-line
//! flags and environment variables override file values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Connection settings for the destination (or source) hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the management API
    pub base_url: String,

    /// Hub to operate on
    pub hub_id: Option<String>,

    /// Bearer token
    pub token: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.amplience.net/v2/content".to_string(),
            hub_id: None,
            token: None,
        }
    }
}

/// Publish queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Publish jobs in flight at once
    pub max_concurrent: usize,

    /// Status polls before a job is given up on
    pub max_attempts: u32,

    /// Delay between status polls
    pub attempt_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_attempts: 30,
            attempt_delay_ms: 1000,
        }
    }
}

impl PublishConfig {
    pub fn attempt_delay(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }
}

/// Local paths
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding mapping files and logs
    pub data_dir: Option<PathBuf>,
}

/// Full configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub hub: HubConfig,
    pub publish: PublishConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Loads configuration from an explicit path or the default location
    ///
    /// A missing file yields the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Invalid(format!(
                        "config file not found: {}",
                        path.display()
                    ))
                    .into());
                }
                path.to_path_buf()
            }
            None => match Self::config_dir() {
                Some(dir) => dir.join("config.toml"),
                None => return Ok(Self::default()),
            },
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse config")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.publish.max_concurrent == 0 {
            return Err(ConfigError::Invalid("publish.max_concurrent must be at least 1".into()).into());
        }
        Ok(())
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "hubmigrate", "hubmigrate")
    }

    /// Returns the default config directory
    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the data directory for mapping files and logs
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".hubmigrate"))
    }

    /// Default mapping file for an import target, e.g. `repo-<id>`
    pub fn default_mapping_path(&self, name: &str) -> PathBuf {
        self.data_dir().join("imports").join(format!("{}.json", name))
    }

    /// Default log file for an action; contains a `<DATE>` token
    pub fn default_log_path(&self, kind: &str, action: &str) -> PathBuf {
        self.data_dir()
            .join("logs")
            .join(format!("{}-{}-<DATE>.log", kind, action))
    }

    /// Applies command-line / environment overrides
    pub fn with_overrides(
        mut self,
        hub_id: Option<String>,
        base_url: Option<String>,
        token: Option<String>,
    ) -> Self {
        if hub_id.is_some() {
            self.hub.hub_id = hub_id;
        }
        if let Some(base_url) = base_url {
            self.hub.base_url = base_url;
        }
        if token.is_some() {
            self.hub.token = token;
        }
        self
    }

    /// Returns the hub ID, or an error if none is configured
    pub fn require_hub_id(&self) -> Result<&str> {
        self.hub.hub_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No hub configured. Pass --hub-id or set HUB_MIGRATE_HUB_ID.")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.publish.max_concurrent, 4);
        assert_eq!(config.publish.max_attempts, 30);
        assert_eq!(config.publish.attempt_delay(), Duration::from_secs(1));
        assert!(config.hub.hub_id.is_none());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[hub]
hub_id = "hub-1"

[publish]
max_concurrent = 2
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.hub.hub_id.as_deref(), Some("hub-1"));
        assert_eq!(config.publish.max_concurrent, 2);
        assert_eq!(config.publish.max_attempts, 30);
    }

    #[test]
    fn load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[paths]\ndata_dir = \"/tmp/hm\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/hm"));
        assert_eq!(
            config.default_mapping_path("repo-1"),
            PathBuf::from("/tmp/hm/imports/repo-1.json")
        );
        assert_eq!(
            config.default_log_path("item", "import"),
            PathBuf::from("/tmp/hm/logs/item-import-<DATE>.log")
        );
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[publish]\nmax_concurrent = 0\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn overrides_win() {
        let config = Config::default().with_overrides(
            Some("hub-2".to_string()),
            Some("http://localhost:9000".to_string()),
            None,
        );

        assert_eq!(config.require_hub_id().unwrap(), "hub-2");
        assert_eq!(config.hub.base_url, "http://localhost:9000");
        assert!(Config::default().require_hub_id().is_err());
    }
}
