//! deskdb pool - resilient data access for the service desk
//!
//! This crate multiplexes a bounded set of storage connections across
//! concurrent request handlers:
//!
//! - `pool` - connection records, FIFO acquisition, idle reaping, shutdown
//! - `executor` - statement classification, single-attempt execution,
//!   transactions and retry with backoff
//! - `cache` - TTL-bounded memoization of read results
//! - `health` - healthy / warning / critical classification of the metrics
//! - `DataAccess` - the facade tying them together
//!
//! # Example
//!
//! ```ignore
//! use deskdb_pool::{DataAccess, DataAccessConfig, QueryOptions};
//!
//! let data = DataAccess::connect(DataAccessConfig::default(), factory).await?;
//! let open = data
//!     .query("SELECT id, title FROM tickets WHERE status = ?", &["open".into()], QueryOptions::cached())
//!     .await?;
//! println!("{}", serde_json::to_string(&data.stats())?);
//! data.close().await;
//! ```

pub mod cache;
mod config;
mod data_access;
pub mod executor;
pub mod health;
mod metrics;
pub mod pool;
mod reporter;

pub use config::DataAccessConfig;
pub use data_access::{DataAccess, QueryOptions, StatusReport};
pub use metrics::{Metrics, MetricsSnapshot};
pub use reporter::{
    DiagnosticReport, ErrorReporter, FailureReport, STATEMENT_PREVIEW_CHARS, TracingReporter,
};
