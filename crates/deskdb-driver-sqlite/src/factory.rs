//! Connection factory handed to the pool

use async_trait::async_trait;
use deskdb_core::{Connection, ConnectionFactory, Result};
use std::sync::Arc;

use crate::{SqliteConfig, SqliteConnection};

/// Opens SQLite connections with a fixed configuration
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    config: SqliteConfig,
}

impl SqliteConnectionFactory {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let conn = SqliteConnection::open(&self.config)?;
        Ok(Arc::new(conn))
    }
}
