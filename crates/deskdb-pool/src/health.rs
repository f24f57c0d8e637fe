//! Health monitoring
//!
//! Classifies the data-access layer as healthy, warning or critical from the
//! current metrics. The classification is recomputed from scratch on every
//! tick and never persisted.
//!
//! # Example
//!
//! ```ignore
//! use deskdb_pool::health::{HealthMonitor, HealthThresholds};
//!
//! let monitor = HealthMonitor::new(HealthThresholds::default(), reporter);
//! let report = monitor.tick(metrics.snapshot(&pool.stats(), &cache.stats()), pool.stats());
//! println!("Status: {:?}, issues: {:?}", report.status, report.issues);
//! ```

mod monitor;
mod status;


pub use monitor::{HealthConfig, HealthMonitor};
pub use status::{HealthReport, HealthStatus, HealthThresholds};
