//! Periodic health evaluation

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::status::{HealthReport, HealthStatus, HealthThresholds};
use crate::metrics::MetricsSnapshot;
use crate::pool::PoolStats;
use crate::reporter::{DiagnosticReport, ErrorReporter};

/// Configuration for the health monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between evaluations in milliseconds
    interval_ms: u64,
    thresholds: HealthThresholds,
}

impl HealthConfig {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::new(30_000)
    }
}

/// Passive observer of the data-access metrics.
///
/// Each tick logs a non-healthy status and sends a full diagnostic to the
/// reporter when critical. It never fails and never touches the pool lock.
pub struct HealthMonitor {
    thresholds: HealthThresholds,
    reporter: Arc<dyn ErrorReporter>,
    last_report: Mutex<HealthReport>,
}

impl HealthMonitor {
    pub fn new(thresholds: HealthThresholds, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            thresholds,
            reporter,
            last_report: Mutex::new(HealthReport::healthy()),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Evaluate one snapshot and remember the result.
    pub fn tick(&self, metrics: MetricsSnapshot, pool: PoolStats) -> HealthReport {
        let report = HealthReport::evaluate(&metrics, &self.thresholds);
        let previous = std::mem::replace(&mut *self.last_report.lock(), report.clone());

        match report.status {
            HealthStatus::Healthy => {
                if !previous.status.is_healthy() {
                    tracing::info!("data access health recovered");
                }
            }
            HealthStatus::Warning => {
                tracing::warn!(issues = ?report.issues, "data access health degraded");
            }
            HealthStatus::Critical => {
                tracing::error!(
                    issues = ?report.issues,
                    total_queries = metrics.total_queries,
                    failed_queries = metrics.failed_queries,
                    "data access health critical"
                );
                self.reporter.report_diagnostic(&DiagnosticReport {
                    health: report.clone(),
                    metrics,
                    pool,
                });
            }
        }

        report
    }

    /// Result of the most recent tick
    pub fn last_report(&self) -> HealthReport {
        self.last_report.lock().clone()
    }

    pub fn last_status(&self) -> HealthStatus {
        self.last_report.lock().status
    }
}
