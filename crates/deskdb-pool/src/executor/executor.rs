//! Single-attempt statement and transaction execution

use std::sync::Arc;

use deskdb_core::{DeskError, QueryOutput, Result, Value};
use tokio::time::Instant;

use super::statement::{Statement, StatementKind};
use crate::metrics::Metrics;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::reporter::preview;

/// Runs statements on pooled connections and records their outcome.
///
/// The borrowed connection is returned to the pool on every exit path because
/// `PooledConnection` gives it back on drop. A connection that failed with a
/// transient error is discarded rather than reused.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: ConnectionPool,
    metrics: Arc<Metrics>,
}

impl QueryExecutor {
    pub fn new(pool: ConnectionPool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn checkout(&self) -> Result<PooledConnection> {
        self.pool.acquire().await.inspect_err(|e| {
            if e.is_connection_error() {
                self.metrics.record_connection_error();
            }
        })
    }

    /// Run one statement once.
    ///
    /// Row-returning statements go through `query`, everything else through
    /// `execute`.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let kind = StatementKind::classify(sql);
        let mut conn = self.checkout().await?;

        let started = Instant::now();
        let result = if kind.returns_rows() {
            conn.query(sql, params).await.map(QueryOutput::Rows)
        } else {
            conn.execute(sql, params).await.map(QueryOutput::Write)
        };
        let elapsed = started.elapsed();
        self.metrics.record_execution(elapsed, result.as_ref().err());

        match &result {
            Ok(_) => conn.record_success(),
            Err(e) => {
                conn.record_failure();
                tracing::debug!(
                    record_id = conn.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    sql_preview = %preview(sql),
                    error = %e,
                    "statement failed"
                );
                if e.is_transient() {
                    conn.discard();
                }
            }
        }
        result
    }

    /// Run `ops` in order inside one transaction on one connection.
    ///
    /// The first failing op rolls the transaction back and is returned as
    /// `DeskError::Transaction` carrying its index; no partial results are
    /// handed out. A failed commit is reported with index `ops.len()`.
    pub async fn transaction(&self, ops: &[Statement]) -> Result<Vec<QueryOutput>> {
        let mut conn = self.checkout().await?;
        let tx = match conn.begin_transaction().await {
            Ok(tx) => tx,
            Err(e) => {
                conn.record_failure();
                if e.is_connection_error() {
                    self.metrics.record_connection_error();
                }
                if e.is_transient() {
                    conn.discard();
                }
                return Err(e);
            }
        };

        let mut outputs = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let started = Instant::now();
            let result = if op.kind().returns_rows() {
                tx.query(&op.sql, &op.params).await.map(QueryOutput::Rows)
            } else {
                tx.execute(&op.sql, &op.params).await.map(QueryOutput::Write)
            };
            self.metrics
                .record_execution(started.elapsed(), result.as_ref().err());

            match result {
                Ok(output) => {
                    conn.record_success();
                    outputs.push(output);
                }
                Err(e) => {
                    conn.record_failure();
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(
                            record_id = conn.id(),
                            error = %rollback_err,
                            "rollback failed"
                        );
                        conn.discard();
                        return Err(DeskError::transaction(index, e));
                    }
                    let error = DeskError::transaction(index, e);
                    if error.is_transient() {
                        conn.discard();
                    }
                    return Err(error);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            conn.record_failure();
            let error = DeskError::transaction(ops.len(), e);
            if error.is_transient() {
                conn.discard();
            }
            return Err(error);
        }

        tracing::debug!(ops = ops.len(), "transaction committed");
        Ok(outputs)
    }
}
