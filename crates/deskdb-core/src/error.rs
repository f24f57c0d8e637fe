//! Error types for the data-access layer

use thiserror::Error;

/// Core error type for deskdb operations
///
/// Variants are split along retry semantics: `Connection` and `TransientQuery`
/// may succeed when attempted again on a fresh connection, everything else is
/// deterministic and is surfaced to the caller immediately.
#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Pool initialization failed: {0}")]
    PoolInit(String),

    #[error("Timed out waiting for a connection after {waited_ms}ms")]
    AcquireTimeout { waited_ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transient query error: {0}")]
    TransientQuery(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction rolled back at operation {failed_op}: {source}")]
    Transaction {
        failed_op: usize,
        #[source]
        source: Box<DeskError>,
    },

    #[error("Pool is shutting down")]
    PoolShuttingDown,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Cancelled")]
    Cancelled,
}

impl DeskError {
    /// Wrap the error that aborted a transaction.
    pub fn transaction(failed_op: usize, source: DeskError) -> Self {
        DeskError::Transaction {
            failed_op,
            source: Box::new(source),
        }
    }

    /// Whether retrying on a fresh connection may succeed.
    ///
    /// A transaction failure is transient when the operation that aborted it was.
    pub fn is_transient(&self) -> bool {
        match self {
            DeskError::Connection(_) | DeskError::TransientQuery(_) => true,
            DeskError::Transaction { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether the failure is attributed to the connection itself.
    pub fn is_connection_error(&self) -> bool {
        match self {
            DeskError::Connection(_) => true,
            DeskError::Transaction { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }

    /// HTTP status class a route handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            DeskError::AcquireTimeout { .. } | DeskError::PoolShuttingDown => 503,
            DeskError::Connection(_) | DeskError::TransientQuery(_) => 503,
            DeskError::Constraint(_) => 409,
            DeskError::Validation(_) => 400,
            DeskError::Transaction { source, .. } => source.http_status(),
            _ => 500,
        }
    }

    /// Message that is safe to show to an end user.
    ///
    /// Never includes statement text, parameters or engine diagnostics.
    pub fn public_message(&self) -> &'static str {
        match self.http_status() {
            503 => "The service is temporarily unavailable, please retry",
            409 => "The request conflicts with existing data",
            400 => "The request contains invalid data",
            _ => "An internal error occurred",
        }
    }
}

/// Result type alias for deskdb operations
pub type Result<T> = std::result::Result<T, DeskError>;
