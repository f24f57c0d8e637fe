//! Connection pooling
//!
//! A bounded set of connections shared by concurrent callers. Callers that find
//! the pool exhausted queue in arrival order and are served by the next release;
//! idle connections beyond `min_size` are closed by `reap_idle`.
//!
//! # Example
//!
//! ```ignore
//! use deskdb_pool::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_acquire_timeout_ms(5000)
//!     .with_idle_timeout_ms(300000);
//!
//! let pool = ConnectionPool::initialize(config, factory).await?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
#[allow(clippy::module_inception)]
mod pool;
mod record;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use pool::{ConnectionPool, PooledConnection};
pub use record::{RecordInfo, RecordState};
pub use stats::PoolStats;
