//! Tests for connection pool functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deskdb_core::{
    Connection, ConnectionFactory, DeskError, QueryResult, Result, StatementResult, Transaction,
    Value,
};
use tokio::sync::mpsc;

use super::config::PoolConfig;
use super::pool::ConnectionPool;
use super::record::RecordState;
use super::stats::PoolStats;

/// Mock connection for testing
struct MockConnection {
    closed: AtomicBool,
}

impl MockConnection {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(DeskError::NotSupported(
            "Transactions not supported in mock".into(),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that counts connections created and can be told to fail
struct MockConnectionFactory {
    counter: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockConnectionFactory {
    fn new() -> Self {
        Self::failing(0)
    }

    /// Fail the next `failures` create calls
    fn failing(failures: usize) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DeskError::Connection("mock store unreachable".into()));
        }
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::new()))
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// PoolConfig tests
// =============================================================================

#[test]
fn test_pool_config_creation() {
    let config = PoolConfig::new(2, 10);
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
    assert_eq!(config.idle_timeout(), Duration::from_millis(300_000));
    assert_eq!(config.max_waiters(), 1024);
    assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
    assert!(config.max_lifetime().is_none());
}

#[test]
fn test_pool_config_with_timeouts() {
    let config = PoolConfig::new(1, 5)
        .with_acquire_timeout_ms(5000)
        .with_idle_timeout_ms(60000)
        .with_max_lifetime_ms(3600000)
        .with_max_waiters(16);

    assert_eq!(config.acquire_timeout(), Duration::from_millis(5000));
    assert_eq!(config.idle_timeout(), Duration::from_millis(60000));
    assert_eq!(config.max_lifetime(), Some(Duration::from_millis(3600000)));
    assert_eq!(config.max_waiters(), 16);
}

#[test]
fn test_pool_config_default() {
    let config = PoolConfig::default();
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 10);
}

#[test]
#[should_panic(expected = "max_size must be greater than 0")]
fn test_pool_config_invalid_max_size() {
    PoolConfig::new(0, 0);
}

#[test]
#[should_panic(expected = "min_size (10) cannot exceed max_size (5)")]
fn test_pool_config_min_exceeds_max() {
    PoolConfig::new(10, 5);
}

#[test]
fn test_pool_config_validate_rejects_deserialized_bounds() {
    let config: PoolConfig =
        serde_json::from_str(r#"{"min_size": 8, "max_size": 4}"#).expect("deserialize");
    assert!(matches!(
        config.validate(),
        Err(DeskError::Configuration(_))
    ));

    let config: PoolConfig = serde_json::from_str(r#"{"max_size": 0}"#).expect("deserialize");
    assert!(config.validate().is_err());
}

#[test]
fn test_pool_config_partial_deserialization_uses_defaults() {
    let config: PoolConfig =
        serde_json::from_str(r#"{"max_size": 4, "acquire_timeout_ms": 250}"#)
            .expect("deserialize");
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 4);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(250));
    assert!(config.validate().is_ok());
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_creation() {
    let stats = PoolStats::new(10, 6, 4, 2, 10);
    assert_eq!(stats.total(), 10);
    assert_eq!(stats.idle(), 6);
    assert_eq!(stats.active(), 4);
    assert_eq!(stats.waiting(), 2);
    assert_eq!(stats.max_size(), 10);
}

#[test]
fn test_pool_stats_utilization() {
    let stats = PoolStats::new(10, 5, 5, 0, 10);
    assert!((stats.utilization() - 0.5).abs() < 0.001);

    let full_stats = PoolStats::new(10, 0, 10, 0, 10);
    assert!((full_stats.utilization() - 1.0).abs() < 0.001);

    let empty_stats = PoolStats::default();
    assert!((empty_stats.utilization() - 0.0).abs() < 0.001);
}

#[test]
fn test_pool_stats_is_full() {
    assert!(PoolStats::new(10, 0, 10, 5, 10).is_full());
    assert!(!PoolStats::new(10, 5, 5, 0, 10).is_full());
    assert!(!PoolStats::default().is_full());
}

// =============================================================================
// Initialization tests
// =============================================================================

#[tokio::test]
async fn test_pool_initialize_opens_min_size() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::initialize(PoolConfig::new(3, 5), factory.clone())
        .await
        .expect("initialize");

    let stats = pool.stats();
    assert_eq!(stats.total(), 3);
    assert_eq!(stats.idle(), 3);
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.created(), 3);
    assert_eq!(factory.count(), 3);
}

#[tokio::test]
async fn test_pool_initialize_fails_when_nothing_opens() {
    let factory = MockConnectionFactory::failing(usize::MAX);
    let result = ConnectionPool::initialize(PoolConfig::new(2, 5), factory).await;
    assert!(matches!(result, Err(DeskError::PoolInit(_))));
}

#[tokio::test]
async fn test_pool_initialize_tolerates_partial_failure() {
    let factory = MockConnectionFactory::failing(2);
    let pool = ConnectionPool::initialize(PoolConfig::new(3, 5), factory)
        .await
        .expect("one of three connections is enough");
    assert_eq!(pool.stats().total(), 1);
}

#[tokio::test]
async fn test_pool_initialize_rejects_invalid_config() {
    let config: PoolConfig =
        serde_json::from_str(r#"{"min_size": 3, "max_size": 1}"#).expect("deserialize");
    let result = ConnectionPool::initialize(config, MockConnectionFactory::new()).await;
    assert!(matches!(result, Err(DeskError::Configuration(_))));
}

// =============================================================================
// Acquire / release tests
// =============================================================================

#[tokio::test]
async fn test_pool_acquire_connection() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 5), MockConnectionFactory::new())
        .await
        .expect("initialize");

    let conn = pool.acquire().await.expect("acquire");
    assert_eq!(conn.driver_name(), "mock");

    let stats = pool.stats();
    assert_eq!(stats.active(), 1);
    assert_eq!(stats.idle(), 0);
}

#[tokio::test]
async fn test_pool_connection_return_is_reused() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 5), factory.clone())
        .await
        .expect("initialize");

    let first_id = {
        let conn = pool.acquire().await.expect("acquire");
        assert_eq!(pool.stats().active(), 1);
        conn.id()
    };

    assert_eq!(pool.stats().active(), 0);
    assert_eq!(pool.stats().idle(), 1);

    let conn = pool.acquire().await.expect("acquire");
    assert_eq!(conn.id(), first_id);
    assert_eq!(factory.count(), 1);
}

#[tokio::test]
async fn test_pool_grows_on_demand_up_to_max() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 3), factory.clone())
        .await
        .expect("initialize");

    let held: Vec<_> = acquire_many(&pool, 3).await;
    assert_eq!(held.len(), 3);
    assert_eq!(factory.count(), 3);
    assert_eq!(pool.stats().total(), 3);
    assert!(pool.stats().is_full());
}

async fn acquire_many(pool: &ConnectionPool, n: usize) -> Vec<super::pool::PooledConnection> {
    let mut held = Vec::with_capacity(n);
    for _ in 0..n {
        held.push(pool.acquire().await.expect("acquire"));
    }
    held
}

#[tokio::test(start_paused = true)]
async fn test_pool_exhausted_caller_receives_released_connection() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 2), MockConnectionFactory::new())
        .await
        .expect("initialize");

    let a = pool.acquire().await.expect("acquire a");
    let b = pool.acquire().await.expect("acquire b");
    let a_id = a.id();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        let conn = waiter_pool.acquire().await.expect("acquire c");
        conn.id()
    });

    settle().await;
    assert_eq!(pool.stats().waiting(), 1);

    drop(a);
    let c_id = waiter.await.expect("join");
    assert_eq!(c_id, a_id);
    assert_eq!(pool.stats().waiting(), 0);
    assert_eq!(pool.stats().total(), 2);
    drop(b);
}

#[tokio::test(start_paused = true)]
async fn test_pool_waiters_are_served_in_arrival_order() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 1), MockConnectionFactory::new())
        .await
        .expect("initialize");
    let held = pool.acquire().await.expect("acquire");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handles = Vec::new();
    for tag in 1..=3 {
        let pool = pool.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.expect("acquire");
            tx.send(tag).expect("send");
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(conn);
        }));
        settle().await;
    }
    assert_eq!(pool.stats().waiting(), 3);

    drop(held);
    for handle in handles {
        handle.await.expect("join");
    }
    drop(tx);

    let mut order = Vec::new();
    while let Some(tag) = rx.recv().await {
        order.push(tag);
    }
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_pool_acquire_timeout_leaves_queue() {
    let config = PoolConfig::new(1, 1).with_acquire_timeout_ms(100);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");
    let held = pool.acquire().await.expect("acquire");

    let result = pool.acquire().await;
    match result {
        Err(DeskError::AcquireTimeout { waited_ms }) => assert!(waited_ms >= 100),
        Err(other) => panic!("expected acquire timeout, got {other}"),
        Ok(_) => panic!("expected acquire timeout"),
    }

    let stats = pool.stats();
    assert_eq!(stats.waiting(), 0);
    assert_eq!(stats.timeouts(), 1);

    // the released connection goes back to idle, not to the departed waiter
    drop(held);
    assert_eq!(pool.stats().idle(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_cancelled_acquire_leaves_queue() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 1), MockConnectionFactory::new())
        .await
        .expect("initialize");
    let held = pool.acquire().await.expect("acquire");

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await.map(|c| c.id()) });
    settle().await;
    assert_eq!(pool.stats().waiting(), 1);

    waiter.abort();
    assert!(waiter.await.is_err());
    assert_eq!(pool.stats().waiting(), 0);

    drop(held);
    let stats = pool.stats();
    assert_eq!(stats.idle(), 1);
    assert_eq!(stats.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_never_lends_more_than_max() {
    let factory = Arc::new(MockConnectionFactory::new());
    let config = PoolConfig::new(1, 3).with_acquire_timeout_ms(60_000);
    let pool = ConnectionPool::initialize(config, factory.clone())
        .await
        .expect("initialize");

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        let in_use = in_use.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.expect("acquire");
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            drop(conn);
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(factory.count() <= 3);
    assert_eq!(pool.stats().active(), 0);
    assert_eq!(pool.stats().waiting(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_full_wait_queue_fails_fast() {
    let config = PoolConfig::new(1, 1).with_max_waiters(1);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");
    let _held = pool.acquire().await.expect("acquire");

    let waiter_pool = pool.clone();
    let _waiter = tokio::spawn(async move { waiter_pool.acquire().await.is_ok() });
    settle().await;

    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(DeskError::AcquireTimeout { waited_ms: 0 })
    ));
}

#[tokio::test]
async fn test_pool_discarded_connection_is_closed() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 2), MockConnectionFactory::new())
        .await
        .expect("initialize");

    let conn = pool.acquire().await.expect("acquire");
    let inner = Arc::clone(conn.inner());
    conn.discard();
    settle().await;

    assert!(inner.is_closed());
    let stats = pool.stats();
    assert_eq!(stats.total(), 0);
    assert_eq!(stats.closed(), 1);

    assert_eq!(pool.ensure_min_size().await, 1);
    assert_eq!(pool.stats().idle(), 1);
}

#[tokio::test]
async fn test_pool_closed_idle_connection_is_skipped() {
    let pool = ConnectionPool::initialize(PoolConfig::new(2, 2), MockConnectionFactory::new())
        .await
        .expect("initialize");

    // kill the connection that would be claimed next
    let first = pool.acquire().await.expect("acquire");
    let first_id = first.id();
    first.close().await.expect("close");
    drop(first);

    let conn = pool.acquire().await.expect("acquire");
    assert_ne!(conn.id(), first_id);
    assert!(!conn.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_pool_max_lifetime_recycles_connection() {
    let config = PoolConfig::new(1, 2).with_max_lifetime_ms(1000);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");

    let first_id = pool.acquire().await.expect("acquire").id();
    tokio::time::advance(Duration::from_secs(2)).await;

    let conn = pool.acquire().await.expect("acquire");
    assert_ne!(conn.id(), first_id);
}

#[tokio::test]
async fn test_pool_record_counters_survive_release() {
    let pool = ConnectionPool::initialize(PoolConfig::new(1, 1), MockConnectionFactory::new())
        .await
        .expect("initialize");

    {
        let mut conn = pool.acquire().await.expect("acquire");
        conn.record_success();
        conn.record_success();
        conn.record_failure();
    }

    let records = pool.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, RecordState::Idle);
    assert_eq!(records[0].query_count, 3);
    assert_eq!(records[0].error_count, 1);

    let _conn = pool.acquire().await.expect("acquire");
    assert_eq!(pool.records()[0].state, RecordState::Busy);
}

// =============================================================================
// Idle reaping tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pool_reap_idle_keeps_min_size() {
    let config = PoolConfig::new(2, 5).with_idle_timeout_ms(1000);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");

    let held = acquire_many(&pool, 5).await;
    drop(held);
    assert_eq!(pool.stats().idle(), 5);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(pool.reap_idle().await, 3);

    let stats = pool.stats();
    assert_eq!(stats.total(), 2);
    assert_eq!(stats.idle(), 2);
    assert_eq!(stats.closed(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pool_reap_idle_spares_recent_connections() {
    let config = PoolConfig::new(0, 5).with_idle_timeout_ms(1000);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");

    let held = acquire_many(&pool, 3).await;
    drop(held);

    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(pool.reap_idle().await, 0);
    assert_eq!(pool.stats().idle(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pool_ensure_min_size_replaces_recycled_connections() {
    let config = PoolConfig::new(2, 4).with_max_lifetime_ms(1000);
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::initialize(config, factory.clone())
        .await
        .expect("initialize");

    // both outlived connections are dropped on checkout and one fresh one is opened
    tokio::time::advance(Duration::from_secs(2)).await;
    let conn = pool.acquire().await.expect("acquire");
    drop(conn);
    assert_eq!(pool.stats().total(), 1);

    assert_eq!(pool.ensure_min_size().await, 1);
    assert_eq!(pool.stats().total(), 2);
    assert_eq!(factory.count(), 4);
}

// =============================================================================
// Shutdown tests
// =============================================================================

#[tokio::test]
async fn test_pool_close_rejects_new_acquires() {
    let pool = ConnectionPool::initialize(PoolConfig::new(2, 4), MockConnectionFactory::new())
        .await
        .expect("initialize");

    pool.close().await;
    assert!(pool.is_shutting_down());
    assert!(matches!(
        pool.acquire().await,
        Err(DeskError::PoolShuttingDown)
    ));

    let stats = pool.stats();
    assert_eq!(stats.total(), 0);
    assert_eq!(stats.closed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pool_close_rejects_waiters_and_force_closes_busy() {
    let config = PoolConfig::new(1, 1).with_shutdown_grace_ms(500);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");
    let held = pool.acquire().await.expect("acquire");

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await.map(|c| c.id()) });
    settle().await;

    pool.close().await;

    assert!(matches!(
        waiter.await.expect("join"),
        Err(DeskError::PoolShuttingDown)
    ));
    assert!(held.is_closed());
    assert_eq!(pool.stats().active(), 0);

    // returning a force-closed connection is harmless
    drop(held);
    assert_eq!(pool.stats().total(), 0);
    assert_eq!(pool.stats().closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_close_waits_for_busy_within_grace() {
    let config = PoolConfig::new(1, 1).with_shutdown_grace_ms(5_000);
    let pool = ConnectionPool::initialize(config, MockConnectionFactory::new())
        .await
        .expect("initialize");
    let held = pool.acquire().await.expect("acquire");
    let inner = Arc::clone(held.inner());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(held);
    });

    let started = tokio::time::Instant::now();
    pool.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    settle().await;
    assert!(inner.is_closed());
    assert_eq!(pool.stats().total(), 0);
}
