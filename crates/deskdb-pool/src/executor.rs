//! Query execution and retry coordination
//!
//! `QueryExecutor` runs one statement (or one transaction) on a pooled
//! connection; `RetryCoordinator` wraps it with bounded retries for transient
//! failures.
//!
//! # Example
//!
//! ```ignore
//! use deskdb_pool::executor::{QueryExecutor, RetryConfig, RetryCoordinator};
//!
//! let executor = QueryExecutor::new(pool, metrics);
//! let retry = RetryCoordinator::new(executor, &RetryConfig::default(), reporter);
//! let output = retry.run("SELECT id FROM tickets WHERE status = ?", &[Value::from("open")]).await?;
//! ```

mod backoff;
#[allow(clippy::module_inception)]
mod executor;
mod retry;
mod statement;


pub use backoff::{BackoffKind, BackoffStrategy};
pub use executor::QueryExecutor;
pub use retry::{RetryConfig, RetryCoordinator};
pub use statement::{Statement, StatementKind};
