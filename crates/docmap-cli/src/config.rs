//! docmap.toml configuration for the walkthrough
//!
//! ```toml
//! log_level = "info"
//!
//! [database]
//! url = "mongodb://127.0.0.1:27017/share"
//! max_pool_size = 20
//! connect_timeout_secs = 10
//!
//! [seed]
//! persons = 5
//! stories = 5
//! rng_seed = 42
//! ```

use anyhow::{Context, Result};
use docmap_mongodb::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_URL: &str = "mongodb://127.0.0.1:27017/share";

/// Database connection config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_pool_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pool_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_time_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            min_pool_size: None,
            max_pool_size: None,
            max_idle_time_secs: None,
            connect_timeout_secs: None,
            server_selection_timeout_secs: None,
            app_name: None,
        }
    }
}

impl DatabaseConfig {
    /// Pool settings, falling back to the library defaults for anything unset
    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            min_pool_size: self.min_pool_size.or(defaults.min_pool_size),
            max_pool_size: self.max_pool_size.or(defaults.max_pool_size),
            max_idle_time: self
                .max_idle_time_secs
                .map(Duration::from_secs)
                .or(defaults.max_idle_time),
            connect_timeout: self
                .connect_timeout_secs
                .map(Duration::from_secs)
                .or(defaults.connect_timeout),
            server_selection_timeout: self
                .server_selection_timeout_secs
                .map(Duration::from_secs)
                .or(defaults.server_selection_timeout),
            app_name: self.app_name.clone().or(defaults.app_name),
        }
    }
}

/// Mock data sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub persons: usize,
    pub stories: usize,
    /// Fixed seed for reproducible data; random when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            persons: 5,
            stories: 5,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub log_level: String,
    pub database: DatabaseConfig,
    pub seed: SeedConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database: DatabaseConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the file when given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DemoConfig::default();
        assert_eq!(config.database.url, DEFAULT_URL);
        assert_eq!(config.seed.persons, 5);
        assert_eq!(config.seed.stories, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_partial_file() {
        let config = DemoConfig::parse(
            r#"
            [database]
            url = "mongodb://db:27017/demo"
            max_pool_size = 50
            connect_timeout_secs = 3

            [seed]
            persons = 12
            rng_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "mongodb://db:27017/demo");
        assert_eq!(config.seed.persons, 12);
        assert_eq!(config.seed.stories, 5);
        assert_eq!(config.seed.rng_seed, Some(7));
        assert_eq!(config.log_level, "info");

        let pool = config.database.pool_config();
        assert_eq!(pool.max_pool_size, Some(50));
        assert_eq!(pool.min_pool_size, Some(5));
        assert_eq!(pool.connect_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(DemoConfig::parse("[seed]\npersons = \"many\"").is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = DemoConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(DemoConfig::parse(&text).unwrap(), config);
    }
}
