//! Tests for the result cache

use std::time::Duration;

use deskdb_core::{ColumnMeta, QueryResult, Row, Value};
use pretty_assertions::assert_eq;

use super::cache::{CacheConfig, ResultCache};
use super::key::{CacheKey, params_digest};

fn tickets(title: &str) -> QueryResult {
    QueryResult {
        columns: vec![
            ColumnMeta {
                name: "id".into(),
                data_type: Some("INTEGER".into()),
                ordinal: 0,
            },
            ColumnMeta {
                name: "title".into(),
                data_type: Some("TEXT".into()),
                ordinal: 1,
            },
        ],
        rows: vec![Row::new(
            vec!["id".into(), "title".into()],
            vec![Value::Integer(1), Value::from(title)],
        )],
        execution_time_ms: 3,
    }
}

fn key(n: i64) -> CacheKey {
    CacheKey::new("SELECT * FROM tickets WHERE id = ?", &[Value::Integer(n)])
}

// =============================================================================
// Key tests
// =============================================================================

#[test]
fn test_cache_key_depends_on_parameters() {
    let sql = "SELECT * FROM tickets WHERE status = ?";
    let open = CacheKey::new(sql, &[Value::from("open")]);
    let closed = CacheKey::new(sql, &[Value::from("closed")]);

    assert_eq!(open, CacheKey::new(sql, &[Value::from("open")]));
    assert_ne!(open, closed);
    assert_eq!(open.as_str().len(), 64);
}

#[test]
fn test_cache_key_separates_statement_from_parameters() {
    let a = CacheKey::new("SELECT 1", &[]);
    let b = CacheKey::new("SELECT 1", &[Value::Null]);
    assert_ne!(a, b);

    // same value, different type
    let text = CacheKey::new("SELECT ?", &[Value::from("1")]);
    let int = CacheKey::new("SELECT ?", &[Value::Integer(1)]);
    assert_ne!(text, int);
}

#[test]
fn test_params_digest_is_stable() {
    let params = vec![Value::from("alice"), Value::Integer(7)];
    assert_eq!(params_digest(&params), params_digest(&params.clone()));
    assert_ne!(params_digest(&params), params_digest(&[]));
    assert!(!params_digest(&params).contains("alice"));
}

// =============================================================================
// Get / put tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cache_round_trip_returns_copy() {
    let cache = ResultCache::new(Duration::from_secs(60), 10);
    let mut original = tickets("Printer jammed");
    cache.put(key(1), &original);

    // mutating the caller's value does not reach the cache
    original.rows.clear();

    let mut first = cache.get(&key(1)).expect("hit");
    assert_eq!(first, tickets("Printer jammed"));

    // nor does mutating a returned value
    first.rows[0].values[1] = Value::from("changed");
    let second = cache.get(&key(1)).expect("hit");
    assert_eq!(second, tickets("Printer jammed"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entry_expires_after_ttl() {
    let cache = ResultCache::new(Duration::from_secs(5), 10);
    cache.put(key(1), &tickets("VPN down"));

    tokio::time::advance(Duration::from_millis(4_999)).await;
    assert!(cache.get(&key(1)).is_some());

    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(cache.get(&key(1)).is_none());
    assert!(cache.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_evicts_oldest_quarter_when_full() {
    let cache = ResultCache::new(Duration::from_secs(60), 8);
    for n in 0..8 {
        cache.put(key(n), &tickets("t"));
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    assert_eq!(cache.len(), 8);

    cache.put(key(100), &tickets("new"));

    // two oldest gone, the rest plus the new entry kept
    assert_eq!(cache.len(), 7);
    assert!(cache.get(&key(0)).is_none());
    assert!(cache.get(&key(1)).is_none());
    assert!(cache.get(&key(2)).is_some());
    assert!(cache.get(&key(100)).is_some());
    assert_eq!(cache.stats().evictions, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_never_exceeds_capacity() {
    let cache = ResultCache::new(Duration::from_secs(60), 5);
    for n in 0..50 {
        cache.put(key(n), &tickets("t"));
        assert!(cache.len() <= 5);
        tokio::time::advance(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_overwrite_does_not_evict() {
    let cache = ResultCache::new(Duration::from_secs(60), 2);
    cache.put(key(1), &tickets("a"));
    cache.put(key(2), &tickets("b"));
    cache.put(key(2), &tickets("c"));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.get(&key(2)), Some(tickets("c")));
}

#[tokio::test(start_paused = true)]
async fn test_cache_purge_expired_sweeps_untouched_entries() {
    let cache = ResultCache::new(Duration::from_secs(1), 10);
    cache.put(key(1), &tickets("old"));
    tokio::time::advance(Duration::from_millis(600)).await;
    cache.put(key(2), &tickets("young"));
    tokio::time::advance(Duration::from_millis(600)).await;

    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&key(2)).is_some());
}

#[test]
fn test_cache_clear_and_zero_capacity() {
    let cache = ResultCache::new(Duration::from_secs(60), 0);
    cache.put(key(1), &tickets("t"));
    assert!(cache.is_empty());

    let cache = ResultCache::from_config(&CacheConfig::default());
    cache.put(key(1), &tickets("t"));
    cache.clear();
    assert!(cache.is_empty());
}

// =============================================================================
// Config tests
// =============================================================================

#[test]
fn test_cache_config_defaults() {
    let config = CacheConfig::default();
    assert!(config.enabled());
    assert_eq!(config.ttl(), Duration::from_secs(300));
    assert_eq!(config.max_entries(), 1000);
    assert!(config.validate().is_ok());

    assert!(!CacheConfig::disabled().enabled());
}

#[test]
fn test_cache_config_rejects_zero_capacity() {
    let config: CacheConfig = serde_json::from_str(r#"{"max_entries": 0}"#).expect("deserialize");
    assert!(config.validate().is_err());
}
