use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::feed::FeedConfig;
use crate::media::MediaConfig;
use crate::store::StoreOptions;

const CONFIG_ENV: &str = "INMOBILIARIA_CONFIG";
const DATABASE_ENV: &str = "INMOBILIARIA_DB";
const FEED_ENV: &str = "INMOBILIARIA_FEED";
const DEFAULT_CONFIG_FILE: &str = "inmobiliaria.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Listings reconciled in parallel
    pub workers: usize,
    pub busy_timeout_ms: u64,
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    pub feed: FeedConfig,
    pub media: MediaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("inmobiliaria.db"),
            workers: 4,
            busy_timeout_ms: 5_000,
            log_level: "info".to_string(),
            feed: FeedConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `$INMOBILIARIA_CONFIG`, else `./inmobiliaria.toml`
    /// if present, else defaults; then apply environment overrides
    pub fn load() -> Result<Config> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(db) = std::env::var_os(DATABASE_ENV) {
            self.database_path = PathBuf::from(db);
        }
        if let Ok(feed) = std::env::var(FEED_ENV) {
            self.feed.source = Some(feed);
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            // One connection per worker plus one for the download pass
            max_connections: (self.workers.max(1) + 1) as u32,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}
