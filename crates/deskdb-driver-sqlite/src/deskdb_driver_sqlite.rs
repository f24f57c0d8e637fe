//! SQLite storage engine
//!
//! Wraps rusqlite behind the `deskdb_core::Connection` trait. The engine is
//! synchronous; each connection serialises access behind its own mutex.

mod config;
mod connection;
mod factory;

pub use config::SqliteConfig;
pub use connection::{SqliteConnection, SqliteTransaction};
pub use factory::SqliteConnectionFactory;
