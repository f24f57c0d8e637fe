//! TTL-bounded result cache

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use deskdb_core::{DeskError, QueryResult, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::key::CacheKey;

/// Configuration for the result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    enabled: bool,
    /// How long an entry stays valid, in milliseconds
    ttl_ms: u64,
    /// Upper bound on stored entries
    max_entries: usize,
}

impl CacheConfig {
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            enabled: true,
            ttl_ms,
            max_entries,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.max_entries == 0 {
            return Err(DeskError::Configuration(
                "cache max_entries must be greater than 0 when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl Default for CacheConfig {
    /// Enabled, 5 minute TTL, 1000 entries
    fn default() -> Self {
        Self::new(300_000, 1000)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped because their TTL passed
    pub expirations: u64,
}

impl CacheStats {
    /// Hits over lookups (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct CacheEntry {
    value: QueryResult,
    inserted_at: Instant,
}

/// Memoizes read results for a limited time.
///
/// Values are cloned on the way in and on the way out, so callers never share
/// a result with the cache. When full, the oldest quarter of the entries (by
/// insertion time) is evicted in one batch.
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries())
    }

    /// Look up a live entry. A stale entry is removed and counted as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<QueryResult> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let fresh = match entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        };

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Store a copy of `value`, evicting the oldest quarter first when full.
    pub fn put(&self, key: CacheKey, value: &QueryResult) {
        if self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let evicted = Self::evict_oldest(&mut entries);
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "result cache full, evicted oldest entries");
        }
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(entries: &mut HashMap<CacheKey, CacheEntry>) -> usize {
        let count = entries.len().div_ceil(4).max(1);
        let mut by_age: Vec<(Instant, CacheKey)> = entries
            .iter()
            .map(|(key, entry)| (entry.inserted_at, key.clone()))
            .collect();
        by_age.sort_by_key(|(inserted_at, _)| *inserted_at);
        for (_, key) in by_age.into_iter().take(count) {
            entries.remove(&key);
        }
        count
    }

    /// Drop every entry whose TTL has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
