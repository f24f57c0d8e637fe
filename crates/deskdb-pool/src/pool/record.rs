//! Pool-managed connection records

use std::sync::Arc;
use std::time::Duration;

use deskdb_core::Connection;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Whether a record currently sits in the idle set or is lent to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Idle,
    Busy,
}

/// A live connection plus the bookkeeping the pool keeps about it
pub(crate) struct ConnectionRecord {
    pub(crate) id: u64,
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) query_count: u64,
    pub(crate) error_count: u64,
}

impl ConnectionRecord {
    pub(crate) fn new(id: u64, connection: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used: now,
            query_count: 0,
            error_count: 0,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_used)
    }

    pub(crate) fn outlived(&self, max_lifetime: Option<Duration>, now: Instant) -> bool {
        max_lifetime.is_some_and(|max| now.duration_since(self.created_at) > max)
    }

    pub(crate) fn info(&self, state: RecordState, now: Instant) -> RecordInfo {
        RecordInfo {
            id: self.id,
            state,
            age_ms: now.duration_since(self.created_at).as_millis() as u64,
            idle_ms: match state {
                RecordState::Idle => self.idle_for(now).as_millis() as u64,
                RecordState::Busy => 0,
            },
            query_count: self.query_count,
            error_count: self.error_count,
        }
    }
}

/// Busy-set entry: enough to report on and force-close a lent record
pub(crate) struct BusyEntry {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) created_at: Instant,
    pub(crate) query_count: u64,
    pub(crate) error_count: u64,
}

impl BusyEntry {
    pub(crate) fn from_record(record: &ConnectionRecord) -> Self {
        Self {
            connection: Arc::clone(&record.connection),
            created_at: record.created_at,
            query_count: record.query_count,
            error_count: record.error_count,
        }
    }

    pub(crate) fn info(&self, id: u64, now: Instant) -> RecordInfo {
        RecordInfo {
            id,
            state: RecordState::Busy,
            age_ms: now.duration_since(self.created_at).as_millis() as u64,
            idle_ms: 0,
            query_count: self.query_count,
            error_count: self.error_count,
        }
    }
}

/// Point-in-time view of one connection record
///
/// Counters of a busy record reflect the values at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub id: u64,
    pub state: RecordState,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub query_count: u64,
    pub error_count: u64,
}
