//! Health status classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSnapshot;

/// Health of the data-access layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Degraded but serving: too many connection errors, slow responses or a nearly full pool
    Warning,
    /// Too large a share of queries is failing
    Critical,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Limits above which the layer is flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Connection errors tolerated before warning
    pub max_connection_errors: u64,
    /// Average response time in milliseconds tolerated before warning
    pub max_avg_response_ms: f64,
    /// Busy share of the pool tolerated before warning (0.0 - 1.0)
    pub max_utilization: f64,
    /// Failed share of all queries tolerated before turning critical (0.0 - 1.0)
    pub max_failure_rate: f64,
}

impl Default for HealthThresholds {
    /// Defaults: warn above 10 connection errors, 1000ms average response or
    /// 90% utilization; critical above 10% failed queries
    fn default() -> Self {
        Self {
            max_connection_errors: 10,
            max_avg_response_ms: 1000.0,
            max_utilization: 0.9,
            max_failure_rate: 0.1,
        }
    }
}

/// Outcome of one health evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Human-readable reasons for a non-healthy status
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            issues: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    /// Classify a metrics snapshot against `thresholds`.
    pub fn evaluate(metrics: &MetricsSnapshot, thresholds: &HealthThresholds) -> Self {
        let mut issues = Vec::new();
        let mut status = HealthStatus::Healthy;

        if metrics.connection_errors > thresholds.max_connection_errors {
            issues.push(format!(
                "{} connection errors (limit {})",
                metrics.connection_errors, thresholds.max_connection_errors
            ));
            status = HealthStatus::Warning;
        }
        if metrics.avg_response_ms > thresholds.max_avg_response_ms {
            issues.push(format!(
                "average response time {:.1}ms (limit {:.0}ms)",
                metrics.avg_response_ms, thresholds.max_avg_response_ms
            ));
            status = HealthStatus::Warning;
        }
        if metrics.pool_utilization > thresholds.max_utilization {
            issues.push(format!(
                "pool utilization {:.0}% (limit {:.0}%)",
                metrics.pool_utilization * 100.0,
                thresholds.max_utilization * 100.0
            ));
            status = HealthStatus::Warning;
        }
        if metrics.failure_rate > thresholds.max_failure_rate {
            issues.push(format!(
                "{:.1}% of queries failed (limit {:.1}%)",
                metrics.failure_rate * 100.0,
                thresholds.max_failure_rate * 100.0
            ));
            status = HealthStatus::Critical;
        }

        Self {
            status,
            issues,
            checked_at: Utc::now(),
        }
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::healthy()
    }
}
