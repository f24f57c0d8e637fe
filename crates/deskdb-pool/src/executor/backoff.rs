//! Delay calculation between retry attempts
//!
//! Linear backoff waits `base × attempt`, exponential backoff waits
//! `base × multiplier^(attempt - 1)`. Both are capped, and optional jitter
//! spreads retries of many callers that failed at the same moment.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay grows with each failed attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Linear,
    Exponential,
}

/// Backoff strategy for query retries.
///
/// # Example
///
/// ```
/// use deskdb_pool::executor::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::linear(1000, 30_000);
///
/// // After the first failed attempt: 1s
/// assert_eq!(backoff.delay_for(1), Duration::from_millis(1000));
///
/// // After the second: 2s
/// assert_eq!(backoff.delay_for(2), Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    kind: BackoffKind,
    /// Delay in milliseconds after the first failed attempt
    base_ms: u64,
    /// Cap applied before jitter
    max_ms: u64,
    /// Growth factor for exponential backoff
    multiplier: f64,
    /// Whether to randomize delays by up to ±25%
    jitter: bool,
}

impl BackoffStrategy {
    pub fn new(kind: BackoffKind, base_ms: u64, max_ms: u64) -> Self {
        Self {
            kind,
            base_ms,
            max_ms: max_ms.max(base_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    pub fn linear(base_ms: u64, max_ms: u64) -> Self {
        Self::new(BackoffKind::Linear, base_ms, max_ms)
    }

    pub fn exponential(base_ms: u64, max_ms: u64) -> Self {
        Self::new(BackoffKind::Exponential, base_ms, max_ms)
    }

    /// Set the growth factor for exponential backoff (at least 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after attempt number `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw_ms = match self.kind {
            BackoffKind::Linear => self.base_ms.saturating_mul(attempt as u64) as f64,
            BackoffKind::Exponential => {
                self.base_ms as f64 * self.multiplier.powi(attempt as i32 - 1)
            }
        };
        let capped_ms = raw_ms.min(self.max_ms as f64) as u64;

        let final_ms = if self.jitter && capped_ms >= 4 {
            let spread = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=spread * 2);
            capped_ms.saturating_sub(spread).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }

    pub fn kind(&self) -> BackoffKind {
        self.kind
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// Linear backoff: 1s per failed attempt, 30 seconds max
    fn default() -> Self {
        Self::linear(1000, 30_000)
    }
}
