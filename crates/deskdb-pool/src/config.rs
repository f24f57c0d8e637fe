//! Data-access configuration

use std::path::Path;
use std::time::Duration;

use deskdb_core::{DeskError, Result};
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::executor::RetryConfig;
use crate::health::HealthConfig;
use crate::pool::PoolConfig;

/// Everything the data-access layer needs besides a connection factory
///
/// Every field has a default, so a TOML file only needs the settings it changes:
///
/// ```toml
/// slow_query_threshold_ms = 500
///
/// [pool]
/// min_size = 4
/// max_size = 20
///
/// [retry]
/// attempts = 5
/// backoff = "exponential"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataAccessConfig {
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    /// Interval of the idle reaper and cache sweep in milliseconds
    pub maintenance_interval_ms: u64,
    /// Executions at or above this many milliseconds count as slow
    pub slow_query_threshold_ms: u64,
}

impl DataAccessConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| DeskError::Configuration(format!("invalid data access config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.retry.validate()?;
        self.cache.validate()?;
        if self.maintenance_interval_ms == 0 {
            return Err(DeskError::Configuration(
                "maintenance_interval_ms must be greater than 0".into(),
            ));
        }
        if self.health.interval().is_zero() {
            return Err(DeskError::Configuration(
                "health interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

impl Default for DataAccessConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            maintenance_interval_ms: 60_000,
            slow_query_threshold_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::BackoffKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = DataAccessConfig::from_toml_str("").expect("parse");
        assert_eq!(config, DataAccessConfig::default());
        assert_eq!(config.maintenance_interval(), Duration::from_secs(60));
        assert_eq!(config.slow_query_threshold(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = DataAccessConfig::from_toml_str(
            r#"
            slow_query_threshold_ms = 250

            [pool]
            min_size = 1
            max_size = 4
            max_waiters = 8

            [retry]
            attempts = 5
            backoff = "exponential"

            [cache]
            enabled = false

            [health.thresholds]
            max_failure_rate = 0.2
            "#,
        )
        .expect("parse");

        assert_eq!(config.slow_query_threshold_ms, 250);
        assert_eq!(config.pool.max_size(), 4);
        assert_eq!(config.pool.max_waiters(), 8);
        assert_eq!(config.retry.attempts(), 5);
        assert_eq!(config.retry.strategy().kind(), BackoffKind::Exponential);
        assert!(!config.cache.enabled());
        assert_eq!(config.health.thresholds().max_failure_rate, 0.2);
        assert_eq!(config.health.thresholds().max_connection_errors, 10);
    }

    #[test]
    fn test_invalid_combinations_are_rejected() {
        let err = DataAccessConfig::from_toml_str("[pool]\nmin_size = 5\nmax_size = 2\n")
            .expect_err("min above max");
        assert!(matches!(err, DeskError::Configuration(_)));

        let err = DataAccessConfig::from_toml_str("[retry]\nattempts = 0\n").expect_err("no attempts");
        assert!(matches!(err, DeskError::Configuration(_)));

        let err = DataAccessConfig::from_toml_str("maintenance_interval_ms = \"soon\"")
            .expect_err("wrong type");
        assert!(err.to_string().contains("invalid data access config"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deskdb.toml");
        std::fs::write(&path, "[pool]\nmax_size = 3\n").expect("write");

        let config = DataAccessConfig::load(&path).expect("load");
        assert_eq!(config.pool.max_size(), 3);

        let missing = DataAccessConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(DeskError::Io(_))));
    }
}
