//! Pool configuration types

use std::time::Duration;

use deskdb_core::{DeskError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, acquire deadlines, idle reaping and shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections created eagerly and kept through idle reaping
    min_size: usize,
    /// Upper bound on live connections (idle + busy)
    max_size: usize,
    /// Default deadline in milliseconds for acquiring a connection
    acquire_timeout_ms: u64,
    /// Idle duration in milliseconds after which a connection may be reaped
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
    /// Maximum number of callers allowed to queue for a connection
    max_waiters: usize,
    /// How long shutdown waits for busy connections to come back
    shutdown_grace_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 300_000,
            max_lifetime_ms: None,
            max_waiters: 1024,
            shutdown_grace_ms: 10_000,
        }
    }

    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    pub fn with_max_waiters(mut self, max_waiters: usize) -> Self {
        self.max_waiters = max_waiters;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }

    /// Check invariants that deserialization cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DeskError::Configuration(
                "pool max_size must be greater than 0".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(DeskError::Configuration(format!(
                "pool min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn max_waiters(&self) -> usize {
        self.max_waiters
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - min_size: 2, max_size: 10
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 5 minutes
    /// - max_waiters: 1024
    /// - shutdown_grace: 10 seconds
    fn default() -> Self {
        Self::new(2, 10)
    }
}
