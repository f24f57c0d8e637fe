//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a connection pool's current occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live connections plus those being opened
    total: usize,
    /// Connections available in the idle set
    idle: usize,
    /// Connections lent to callers
    active: usize,
    /// Callers queued for a connection
    waiting: usize,
    /// Configured upper bound
    max_size: usize,
    /// Connections opened over the pool's lifetime
    created: u64,
    /// Connections closed over the pool's lifetime
    closed: u64,
    /// Acquire calls that ended in a timeout
    timeouts: u64,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize, max_size: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
            max_size,
            created: 0,
            closed: 0,
            timeouts: 0,
        }
    }

    pub(crate) fn with_lifetime_counters(mut self, created: u64, closed: u64, timeouts: u64) -> Self {
        self.created = created;
        self.closed = closed;
        self.timeouts = timeouts;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn closed(&self) -> u64 {
        self.closed
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Busy connections as a fraction of the configured maximum (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Check if every allowed connection is lent out
    pub fn is_full(&self) -> bool {
        self.max_size > 0 && self.active >= self.max_size
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }
}
