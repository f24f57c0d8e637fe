//! SQLite connection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-level settings applied to every connection when it is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`
    pub path: String,
    /// `PRAGMA journal_mode`
    pub journal_mode: String,
    /// `PRAGMA synchronous`
    pub synchronous: String,
    /// `PRAGMA foreign_keys`
    pub foreign_keys: bool,
    /// How long SQLite itself retries on a locked database before reporting busy
    pub busy_timeout_ms: u64,
    /// `PRAGMA cache_size` (negative values are KiB)
    pub cache_size: Option<i64>,
}

impl SqliteConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_journal_mode(mut self, mode: impl Into<String>) -> Self {
        self.journal_mode = mode.into();
        self
    }

    pub fn with_busy_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    pub fn with_cache_size(mut self, pages: i64) -> Self {
        self.cache_size = Some(pages);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "deskdb.sqlite".to_string(),
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            cache_size: None,
        }
    }
}
