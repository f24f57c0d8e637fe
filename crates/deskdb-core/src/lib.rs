//! deskdb core - shared abstractions for the data-access layer
//!
//! This crate defines the boundary between the pool and the storage engine:
//!
//! - `Connection` / `Transaction` - what a storage engine must provide
//! - `ConnectionFactory` - how the pool opens new connections
//! - `DeskError` - the failure taxonomy shared by every layer
//! - `Value`, `Row`, `QueryResult`, `StatementResult` - data exchanged with callers

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
