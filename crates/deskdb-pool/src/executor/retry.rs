//! Retry coordination for single statements

use std::sync::Arc;
use std::time::Duration;

use deskdb_core::{DeskError, QueryOutput, Result, Value};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::backoff::{BackoffKind, BackoffStrategy};
use super::executor::QueryExecutor;
use super::statement::Statement;
use crate::reporter::{ErrorReporter, FailureReport, preview};

/// Configuration for retrying transient failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per statement, the first one included
    attempts: u32,
    /// Base delay in milliseconds between attempts
    delay_ms: u64,
    /// Upper bound on a single delay
    max_delay_ms: u64,
    backoff: BackoffKind,
    jitter: bool,
}

impl RetryConfig {
    pub fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts,
            delay_ms,
            max_delay_ms: 30_000,
            backoff: BackoffKind::Linear,
            jitter: false,
        }
    }

    /// A policy that never retries
    pub fn disabled() -> Self {
        Self::new(1, 0)
    }

    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(DeskError::Configuration(
                "retry attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn strategy(&self) -> BackoffStrategy {
        BackoffStrategy::new(self.backoff, self.delay_ms, self.max_delay_ms).with_jitter(self.jitter)
    }
}

impl Default for RetryConfig {
    /// Defaults: 3 attempts, linear backoff of 1 second per failed attempt
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Runs statements through a `QueryExecutor`, retrying transient failures
/// on a freshly acquired connection.
///
/// Retries are invisible to the caller apart from the added latency; once the
/// attempts are exhausted the last error is reported and returned.
pub struct RetryCoordinator {
    executor: QueryExecutor,
    attempts: u32,
    backoff: BackoffStrategy,
    reporter: Arc<dyn ErrorReporter>,
}

impl RetryCoordinator {
    pub fn new(executor: QueryExecutor, config: &RetryConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            executor,
            attempts: config.attempts().max(1),
            backoff: config.strategy(),
            reporter,
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Run one statement, retrying while the failure is transient.
    pub async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            match self.executor.execute(sql, params).await {
                Ok(output) => {
                    if attempt > 1 {
                        tracing::info!(attempt, sql_preview = %preview(sql), "statement succeeded after retry");
                    }
                    return Ok(output);
                }
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    self.executor.metrics().record_retry();
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        sql_preview = %preview(sql),
                        error = %e,
                        "transient failure, retrying on a fresh connection"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let report = FailureReport::new(&e, sql, params, attempt, started.elapsed());
                    tracing::error!(
                        correlation_id = %report.correlation_id,
                        attempt,
                        elapsed_ms = report.elapsed_ms,
                        sql_preview = %report.statement,
                        params_digest = %report.params_digest,
                        error = %e,
                        "statement failed"
                    );
                    self.reporter.report_failure(&report);
                    return Err(e);
                }
            }
        }
    }

    /// Run an ordered list of statements atomically. Transactions are never retried.
    pub async fn transaction(&self, ops: &[Statement]) -> Result<Vec<QueryOutput>> {
        let started = Instant::now();
        match self.executor.transaction(ops).await {
            Ok(outputs) => Ok(outputs),
            Err(e) => {
                // an index past the last op means the commit itself failed
                let (sql, params): (&str, &[Value]) = match &e {
                    DeskError::Transaction { failed_op, .. } => match ops.get(*failed_op) {
                        Some(op) => (op.sql.as_str(), op.params.as_slice()),
                        None => ("COMMIT", &[][..]),
                    },
                    _ => ("BEGIN", &[][..]),
                };
                let report = FailureReport::new(&e, sql, params, 1, started.elapsed());
                tracing::error!(
                    correlation_id = %report.correlation_id,
                    ops = ops.len(),
                    elapsed_ms = report.elapsed_ms,
                    sql_preview = %report.statement,
                    params_digest = %report.params_digest,
                    error = %e,
                    "transaction rolled back"
                );
                self.reporter.report_failure(&report);
                Err(e)
            }
        }
    }
}
