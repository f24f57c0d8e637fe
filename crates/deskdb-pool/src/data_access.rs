//! The data-access facade handed to request handlers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deskdb_core::{ConnectionFactory, DeskError, QueryOutput, Result, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::config::DataAccessConfig;
use crate::executor::{QueryExecutor, RetryCoordinator, Statement, StatementKind};
use crate::health::{HealthMonitor, HealthReport};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::{ConnectionPool, PoolStats, RecordInfo};
use crate::reporter::{ErrorReporter, TracingReporter};

/// Per-call options for `DataAccess::query`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Serve and store read results through the result cache
    pub cache: bool,
}

impl QueryOptions {
    pub fn cached() -> Self {
        Self { cache: true }
    }
}

/// Snapshot served by the operational-status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub pool: PoolStats,
    pub records: Vec<RecordInfo>,
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
    pub health: HealthReport,
    pub generated_at: DateTime<Utc>,
}

/// Pool, retrying executor, result cache and health monitor behind one handle.
///
/// Construct it once at startup and share it (`Arc<DataAccess>`) with the
/// request handlers.
pub struct DataAccess {
    pool: ConnectionPool,
    coordinator: RetryCoordinator,
    cache: Option<Arc<ResultCache>>,
    metrics: Arc<Metrics>,
    monitor: Arc<HealthMonitor>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DataAccess {
    /// Open the pool and start the maintenance and health tasks.
    pub async fn connect<F: ConnectionFactory>(config: DataAccessConfig, factory: F) -> Result<Self> {
        Self::connect_with_reporter(config, factory, Arc::new(TracingReporter)).await
    }

    pub async fn connect_with_reporter<F: ConnectionFactory>(
        config: DataAccessConfig,
        factory: F,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::initialize(config.pool.clone(), factory).await?;
        let metrics = Arc::new(Metrics::new(config.slow_query_threshold()));
        let cache = config
            .cache
            .enabled()
            .then(|| Arc::new(ResultCache::from_config(&config.cache)));
        let monitor = Arc::new(HealthMonitor::new(
            config.health.thresholds().clone(),
            Arc::clone(&reporter),
        ));
        let coordinator = RetryCoordinator::new(
            QueryExecutor::new(pool.clone(), Arc::clone(&metrics)),
            &config.retry,
            reporter,
        );

        let data_access = Self {
            pool,
            coordinator,
            cache,
            metrics,
            monitor,
            tasks: Mutex::new(Vec::new()),
        };
        data_access.spawn_background_tasks(&config);

        tracing::info!(
            cache_enabled = data_access.cache.is_some(),
            retry_attempts = config.retry.attempts(),
            "data access layer ready"
        );
        Ok(data_access)
    }

    fn spawn_background_tasks(&self, config: &DataAccessConfig) {
        let maintenance = {
            let pool = self.pool.clone();
            let cache = self.cache.clone();
            let period = config.maintenance_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let reaped = pool.reap_idle().await;
                    let opened = pool.ensure_min_size().await;
                    let expired = cache.as_ref().map_or(0, |c| c.purge_expired());
                    tracing::debug!(reaped, opened, expired, "maintenance pass finished");
                }
            })
        };

        let health = {
            let pool = self.pool.clone();
            let cache = self.cache.clone();
            let metrics = Arc::clone(&self.metrics);
            let monitor = Arc::clone(&self.monitor);
            let period = config.health.interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let pool_stats = pool.stats();
                    let cache_stats = cache.as_ref().map(|c| c.stats()).unwrap_or_default();
                    monitor.tick(metrics.snapshot(&pool_stats, &cache_stats), pool_stats);
                }
            })
        };

        self.tasks.lock().extend([maintenance, health]);
    }

    /// Run one statement.
    ///
    /// With `options.cache`, read statements are answered from the result
    /// cache when possible and their results stored afterwards. Writes and
    /// introspection statements always reach the store.
    pub async fn query(&self, sql: &str, params: &[Value], options: QueryOptions) -> Result<QueryOutput> {
        if self.pool.is_shutting_down() {
            return Err(DeskError::PoolShuttingDown);
        }

        let cache = self
            .cache
            .as_ref()
            .filter(|_| options.cache && StatementKind::classify(sql).is_cacheable());
        let Some(cache) = cache else {
            return self.coordinator.run(sql, params).await;
        };

        let key = CacheKey::new(sql, params);
        if let Some(rows) = cache.get(&key) {
            tracing::trace!(cache_key = %key, "result cache hit");
            return Ok(QueryOutput::Rows(rows));
        }

        let output = self.coordinator.run(sql, params).await?;
        if let QueryOutput::Rows(rows) = &output {
            cache.put(key, rows);
        }
        Ok(output)
    }

    /// Run `ops` atomically on one connection, returning one output per op.
    pub async fn transaction(&self, ops: &[Statement]) -> Result<Vec<QueryOutput>> {
        self.coordinator.transaction(ops).await
    }

    pub fn stats(&self) -> StatusReport {
        let pool = self.pool.stats();
        let cache = self.cache_stats();
        let metrics = self.metrics.snapshot(&pool, &cache);
        let health = HealthReport::evaluate(&metrics, self.monitor.thresholds());
        StatusReport {
            pool,
            records: self.pool.records(),
            metrics,
            cache,
            health,
            generated_at: Utc::now(),
        }
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.as_ref().map(|c| c.stats()).unwrap_or_default()
    }

    /// Drop every cached result, e.g. after a write made them stale.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::debug!("result cache cleared");
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn health_monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Stop background tasks and shut the pool down.
    pub async fn close(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
        }
        self.pool.close().await;
        self.clear_cache();
    }
}

impl Drop for DataAccess {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
