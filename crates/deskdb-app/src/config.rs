//! Service configuration file
//!
//! A single TOML file holds the storage settings, the data-access tuning and
//! logging. Every table is optional:
//!
//! ```toml
//! [storage]
//! path = "/var/lib/deskdb/desk.sqlite"
//!
//! [data_access.pool]
//! min_size = 2
//! max_size = 8
//!
//! [logging]
//! enable_console_logs = false
//! ```

use std::path::Path;

use anyhow::Context as _;
use deskdb_driver_sqlite::SqliteConfig;
use deskdb_pool::DataAccessConfig;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Environment variable naming the config file when no path is given on the command line
pub const CONFIG_PATH_ENV: &str = "DESKDB_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: SqliteConfig,
    pub data_access: DataAccessConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(source).context("parsing service config")?;
        config.data_access.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("loading {}", path.display()))
    }

    /// Load from an explicit path, then `DESKDB_CONFIG`, falling back to defaults
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_nested_tables() {
        let config = AppConfig::from_toml_str(
            r#"
            [storage]
            path = "desk.sqlite"
            busy_timeout_ms = 250

            [data_access]
            slow_query_threshold_ms = 200

            [data_access.pool]
            min_size = 1
            max_size = 3

            [logging]
            enable_json_logs = false
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.path, "desk.sqlite");
        assert_eq!(config.storage.busy_timeout_ms, 250);
        assert_eq!(config.data_access.slow_query_threshold_ms, 200);
        assert_eq!(config.data_access.pool.max_size(), 3);
        assert!(!config.logging.enable_json_logs);
    }

    #[test]
    fn test_invalid_pool_bounds_are_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [data_access.pool]
            min_size = 5
            max_size = 2
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_size"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = AppConfig::load(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.toml"));
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskdb.toml");
        std::fs::write(&path, "[storage]\npath = \":memory:\"\n").unwrap();

        let config = AppConfig::resolve(Some(&path)).unwrap();
        assert!(config.storage.is_memory());
    }
}
