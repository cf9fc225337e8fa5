//! Runtime settings for the catalog service.
//!
//! Values come from `config/catalog.toml` when present, then from
//! `CATALOG__*` environment variables (e.g. `CATALOG__DATABASE__PATH`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config/catalog.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    "data/catalog.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl CatalogConfig {
    /// Load settings from the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix("CATALOG").separator("__")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings = builder.build()?;
        settings.try_deserialize::<CatalogConfig>().map_err(|e| {
            ConfigError::Message(format!("Catalog configuration is invalid: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_when_no_sources() {
        let config = CatalogConfig::from_builder(Config::builder()).unwrap();
        assert_eq!(config.database.path, "data/catalog.db");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [database]
            path = "/tmp/catalog-test.db"
            max_connections = 2
        "#;
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = CatalogConfig::from_builder(builder).unwrap();
        assert_eq!(config.database.path, "/tmp/catalog-test.db");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }
}
