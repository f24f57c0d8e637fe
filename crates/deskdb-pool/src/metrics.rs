//! Query metrics
//!
//! Counters only ever grow for the lifetime of the data-access layer. Derived
//! values (averages and rates) are computed when a snapshot is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use deskdb_core::DeskError;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::pool::PoolStats;

/// Lock-free counters updated on every execution
#[derive(Debug)]
pub struct Metrics {
    slow_query_threshold: Duration,
    total_queries: AtomicU64,
    successful_queries: AtomicU64,
    failed_queries: AtomicU64,
    slow_queries: AtomicU64,
    retries: AtomicU64,
    connection_errors: AtomicU64,
    total_response_us: AtomicU64,
    max_response_us: AtomicU64,
}

impl Metrics {
    pub fn new(slow_query_threshold: Duration) -> Self {
        Self {
            slow_query_threshold,
            total_queries: AtomicU64::new(0),
            successful_queries: AtomicU64::new(0),
            failed_queries: AtomicU64::new(0),
            slow_queries: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            total_response_us: AtomicU64::new(0),
            max_response_us: AtomicU64::new(0),
        }
    }

    /// Record one statement execution and its outcome.
    pub fn record_execution(&self, elapsed: Duration, error: Option<&DeskError>) {
        let micros = elapsed.as_micros() as u64;
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_response_us.fetch_add(micros, Ordering::Relaxed);
        self.max_response_us.fetch_max(micros, Ordering::Relaxed);

        match error {
            None => {
                self.successful_queries.fetch_add(1, Ordering::Relaxed);
            }
            Some(e) => {
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
                if e.is_connection_error() {
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if elapsed >= self.slow_query_threshold {
            self.slow_queries.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.slow_query_threshold.as_millis() as u64,
                "slow query"
            );
        }
    }

    /// A connection failure that happened outside a statement (e.g. while opening)
    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
    }

    pub fn snapshot(&self, pool: &PoolStats, cache: &CacheStats) -> MetricsSnapshot {
        MetricsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            successful_queries: self.successful_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            total_response_ms: self.total_response_us.load(Ordering::Relaxed) as f64 / 1000.0,
            max_response_ms: self.max_response_us.load(Ordering::Relaxed) as f64 / 1000.0,
            cache_hit_rate: cache.hit_rate(),
            pool_utilization: pool.utilization(),
            ..MetricsSnapshot::default()
        }
        .derive_rates()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

/// Point-in-time copy of the counters plus derived rates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub slow_queries: u64,
    pub retries: u64,
    pub connection_errors: u64,
    /// Cumulative time spent executing statements
    pub total_response_ms: f64,
    pub max_response_ms: f64,
    /// Mean execution time in milliseconds
    pub avg_response_ms: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    /// Cache hits over cache lookups (0.0 - 1.0)
    pub cache_hit_rate: f64,
    /// Busy connections over the pool maximum (0.0 - 1.0)
    pub pool_utilization: f64,
}

impl MetricsSnapshot {
    pub fn new() -> Self {
        Self::default().derive_rates()
    }

    pub fn with_total_queries(mut self, count: u64) -> Self {
        self.total_queries = count;
        self.successful_queries = count.saturating_sub(self.failed_queries);
        self.derive_rates()
    }

    pub fn with_failed_queries(mut self, count: u64) -> Self {
        self.failed_queries = count;
        self.successful_queries = self.total_queries.saturating_sub(count);
        self.derive_rates()
    }

    pub fn with_connection_errors(mut self, count: u64) -> Self {
        self.connection_errors = count;
        self
    }

    pub fn with_total_response_ms(mut self, ms: f64) -> Self {
        self.total_response_ms = ms;
        self.derive_rates()
    }

    pub fn with_pool_utilization(mut self, utilization: f64) -> Self {
        self.pool_utilization = utilization;
        self
    }

    fn derive_rates(mut self) -> Self {
        if self.total_queries == 0 {
            self.avg_response_ms = 0.0;
            self.success_rate = 1.0;
            self.failure_rate = 0.0;
        } else {
            let total = self.total_queries as f64;
            self.avg_response_ms = self.total_response_ms / total;
            self.success_rate = self.successful_queries as f64 / total;
            self.failure_rate = self.failed_queries as f64 / total;
        }
        self
    }
}
