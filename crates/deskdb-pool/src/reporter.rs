//! Error-reporting collaborator
//!
//! Failures and critical health diagnostics are handed to an `ErrorReporter`.
//! Reports carry a truncated statement and a parameter digest, never the raw
//! parameter values.

use std::time::Duration;

use chrono::{DateTime, Utc};
use deskdb_core::{DeskError, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::params_digest;
use crate::health::HealthReport;
use crate::metrics::MetricsSnapshot;
use crate::pool::PoolStats;

/// Maximum number of statement characters carried in logs and reports
pub const STATEMENT_PREVIEW_CHARS: usize = 100;

/// Shorten a statement for logging.
pub(crate) fn preview(sql: &str) -> String {
    match sql.char_indices().nth(STATEMENT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}

/// A failed operation, as seen by the reporting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Identifier shared with the log line and the caller-facing message
    pub correlation_id: Uuid,
    pub message: String,
    /// Statement text, truncated
    pub statement: String,
    /// SHA-256 of the canonical parameter encoding
    pub params_digest: String,
    /// Attempts made, the failing one included
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub transient: bool,
    pub http_status: u16,
    pub occurred_at: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(
        error: &DeskError,
        sql: &str,
        params: &[Value],
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            message: error.to_string(),
            statement: preview(sql),
            params_digest: params_digest(params),
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
            transient: error.is_transient(),
            http_status: error.http_status(),
            occurred_at: Utc::now(),
        }
    }
}

/// Full metrics snapshot sent when the pool turns critical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub health: HealthReport,
    pub metrics: MetricsSnapshot,
    pub pool: PoolStats,
}

/// Receives structured failure and diagnostic records.
///
/// Implementations must not block; they are called on the request path.
pub trait ErrorReporter: Send + Sync {
    fn report_failure(&self, report: &FailureReport);

    fn report_diagnostic(&self, report: &DiagnosticReport);
}

/// Reporter that emits records as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_failure(&self, report: &FailureReport) {
        tracing::error!(
            target: "deskdb::report",
            correlation_id = %report.correlation_id,
            statement = %report.statement,
            params_digest = %report.params_digest,
            attempts = report.attempts,
            elapsed_ms = report.elapsed_ms,
            transient = report.transient,
            "{}",
            report.message
        );
    }

    fn report_diagnostic(&self, report: &DiagnosticReport) {
        match serde_json::to_string(report) {
            Ok(json) => tracing::error!(target: "deskdb::report", diagnostic = %json, "pool health critical"),
            Err(e) => tracing::error!(target: "deskdb::report", error = %e, "failed to encode diagnostic report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_statements() {
        let long = format!("SELECT {} FROM tickets", "a, ".repeat(80));
        let shortened = preview(&long);
        assert!(shortened.ends_with("..."));
        assert_eq!(shortened.chars().count(), STATEMENT_PREVIEW_CHARS + 3);

        assert_eq!(preview("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let sql = "é".repeat(150);
        let shortened = preview(&sql);
        assert!(shortened.starts_with("éé"));
        assert_eq!(shortened.chars().count(), STATEMENT_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_failure_report_hides_parameters() {
        let error = DeskError::Constraint("UNIQUE constraint failed: users.email".into());
        let params = vec![Value::from("secret@example.com")];
        let report = FailureReport::new(
            &error,
            "INSERT INTO users (email) VALUES (?)",
            &params,
            1,
            Duration::from_millis(12),
        );

        assert_eq!(report.attempts, 1);
        assert_eq!(report.elapsed_ms, 12);
        assert_eq!(report.http_status, 409);
        assert!(!report.transient);
        assert_eq!(report.params_digest.len(), 64);

        let json = serde_json::to_string(&report).expect("serialize");
        assert!(!json.contains("secret@example.com"));
    }
}
