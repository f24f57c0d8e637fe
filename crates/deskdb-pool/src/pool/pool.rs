//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use deskdb_core::{Connection, ConnectionFactory, DeskError, Result};
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::record::{BusyEntry, ConnectionRecord, RecordInfo, RecordState};
use super::stats::PoolStats;

/// A caller suspended in `acquire`, waiting for a released record
struct Waiter {
    id: u64,
    tx: oneshot::Sender<ConnectionRecord>,
}

/// Everything guarded by the pool lock.
///
/// A record is either in `idle` or has an entry in `busy`, never both.
/// `creating` counts slots reserved for connections being opened.
#[derive(Default)]
struct PoolState {
    idle: VecDeque<ConnectionRecord>,
    busy: HashMap<u64, BusyEntry>,
    creating: usize,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    shutting_down: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle.len() + self.busy.len() + self.creating
    }

    /// Claim the most recently used idle record that is still usable.
    ///
    /// Closed or over-age records are moved to `discarded` for closing outside the lock.
    fn claim_idle(
        &mut self,
        config: &PoolConfig,
        now: Instant,
        discarded: &mut Vec<ConnectionRecord>,
    ) -> Option<ConnectionRecord> {
        while let Some(record) = self.idle.pop_back() {
            if record.connection.is_closed() || record.outlived(config.max_lifetime(), now) {
                discarded.push(record);
                continue;
            }
            self.busy.insert(record.id, BusyEntry::from_record(&record));
            return Some(record);
        }
        None
    }

    /// Hand a record that is not tracked as busy to the oldest waiter, or park it as idle.
    fn place(&mut self, mut record: ConnectionRecord) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            let id = record.id;
            let entry = BusyEntry::from_record(&record);
            match waiter.tx.send(record) {
                Ok(()) => {
                    self.busy.insert(id, entry);
                    return true;
                }
                // receiver already gone, try the next waiter
                Err(returned) => record = returned,
            }
        }
        self.idle.push_back(record);
        false
    }
}

struct PoolInner {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    next_record_id: AtomicU64,
    /// Signalled whenever a lent record comes back
    released: Notify,
    created: AtomicU64,
    closed: AtomicU64,
    timeouts: AtomicU64,
}

impl PoolInner {
    async fn open_record(&self) -> Result<ConnectionRecord> {
        let connection = self.factory.create().await?;
        let id = self.next_record_id.fetch_add(1, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(record_id = id, "opened pooled connection");
        Ok(ConnectionRecord::new(id, connection))
    }

    async fn close_now(&self, record: ConnectionRecord) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = record.connection.close().await {
            tracing::warn!(record_id = record.id, error = %e, "error closing pooled connection");
        }
    }

    /// Close a record without blocking the caller.
    fn retire(&self, record: ConnectionRecord) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        let ConnectionRecord { id, connection, .. } = record;
        tracing::debug!(record_id = id, "retiring pooled connection");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = connection.close().await {
                    tracing::warn!(record_id = id, error = %e, "error closing pooled connection");
                }
            });
        }
    }

    /// Return a lent record.
    ///
    /// Healthy records go to the oldest waiter first and only then to the idle set.
    fn release(self: &Arc<Self>, mut record: ConnectionRecord, reusable: bool) {
        record.touch();
        let (retired, replenish) = {
            let mut state = self.state.lock();
            let tracked = state.busy.remove(&record.id).is_some();
            if state.shutting_down {
                // force-closed records are no longer tracked and are already closed
                (tracked.then_some(record), false)
            } else if !reusable || record.connection.is_closed() {
                (Some(record), !state.waiters.is_empty())
            } else {
                state.place(record);
                (None, false)
            }
        };
        self.released.notify_waiters();
        if let Some(record) = retired {
            self.retire(record);
        }
        if replenish {
            self.spawn_replenish();
        }
    }

    /// Put a freshly opened record into circulation.
    fn admit(&self, reservation: CreateReservation<'_>, record: ConnectionRecord) {
        let retired = {
            let mut state = self.state.lock();
            reservation.complete(&mut state);
            if state.shutting_down {
                Some(record)
            } else {
                state.place(record);
                None
            }
        };
        if let Some(record) = retired {
            self.retire(record);
        }
    }

    /// Open a connection for queued callers after capacity was freed without a handoff.
    fn spawn_replenish(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(self);
        handle.spawn(async move { inner.replenish_waiters().await });
    }

    async fn replenish_waiters(self: Arc<Self>) {
        let reservation = {
            let mut state = self.state.lock();
            if state.shutting_down
                || state.waiters.is_empty()
                || state.total() >= self.config.max_size()
            {
                return;
            }
            state.creating += 1;
            CreateReservation::new(&self)
        };
        match self.open_record().await {
            Ok(record) => self.admit(reservation, record),
            Err(e) => {
                tracing::warn!(error = %e, "failed to open connection for queued callers");
            }
        }
    }
}

/// A slot in `PoolState::creating`, given back if the opening future is dropped.
struct CreateReservation<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl<'a> CreateReservation<'a> {
    fn new(inner: &'a PoolInner) -> Self {
        Self { inner, armed: true }
    }

    fn complete(mut self, state: &mut PoolState) {
        state.creating -= 1;
        self.armed = false;
    }
}

impl Drop for CreateReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().creating -= 1;
        }
    }
}

/// A queued acquire. Dropping it removes the waiter and gives back any record
/// that was handed over but never picked up.
struct WaitSlot {
    inner: Arc<PoolInner>,
    id: u64,
    rx: oneshot::Receiver<ConnectionRecord>,
    armed: bool,
}

impl WaitSlot {
    /// Leave the queue. Returns the record if a release got to us first.
    fn cancel(&mut self) -> Option<ConnectionRecord> {
        self.armed = false;
        let still_queued = {
            let mut state = self.inner.state.lock();
            match state.waiters.iter().position(|w| w.id == self.id) {
                Some(pos) => {
                    state.waiters.remove(pos);
                    true
                }
                None => false,
            }
        };
        // handoffs happen under the lock, so once we are out of the queue this is final
        if still_queued {
            None
        } else {
            self.rx.try_recv().ok()
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WaitSlot {
    fn drop(&mut self) {
        if self.armed
            && let Some(record) = self.cancel()
        {
            self.inner.release(record, true);
        }
    }
}

enum AcquireStep {
    Ready(ConnectionRecord),
    Create,
    Wait(WaitSlot),
}

/// A bounded pool of connections shared by concurrent callers
///
/// Cloning is cheap; clones share the same underlying pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create the pool and eagerly open `min_size` connections.
    ///
    /// Individual failures are logged and skipped; the pool is only rejected
    /// when not a single connection could be opened.
    pub async fn initialize<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                factory: Arc::new(factory),
                state: Mutex::new(PoolState::default()),
                next_record_id: AtomicU64::new(1),
                released: Notify::new(),
                created: AtomicU64::new(0),
                closed: AtomicU64::new(0),
                timeouts: AtomicU64::new(0),
            }),
        };

        // open at least one connection so an unreachable store fails fast
        let target = pool.inner.config.min_size().max(1);
        let mut opened = 0;
        let mut last_error = None;
        for _ in 0..target {
            match pool.inner.open_record().await {
                Ok(record) => {
                    pool.inner.state.lock().idle.push_back(record);
                    opened += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open connection during pool initialization");
                    last_error = Some(e);
                }
            }
        }

        if opened == 0 {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(DeskError::PoolInit(format!(
                "could not open any of {} connections: {}",
                target, reason
            )));
        }

        tracing::info!(
            opened,
            requested = target,
            max_size = pool.inner.config.max_size(),
            "connection pool initialized"
        );
        Ok(pool)
    }

    /// Get a connection, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_until(Instant::now() + self.inner.config.acquire_timeout())
            .await
    }

    /// Get a connection, waiting until `deadline` at the latest.
    ///
    /// This will:
    /// 1. Claim an idle connection if nobody is queued ahead of us
    /// 2. Otherwise open a new connection if under `max_size`
    /// 3. Otherwise queue (FIFO) until a release hands us a connection
    pub async fn acquire_until(&self, deadline: Instant) -> Result<PooledConnection> {
        let started = Instant::now();
        let mut discarded = Vec::new();
        let mut replenish = false;

        let step = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return Err(DeskError::PoolShuttingDown);
            }

            let claimed = if state.waiters.is_empty() {
                state.claim_idle(&self.inner.config, started, &mut discarded)
            } else {
                None
            };

            match claimed {
                Some(record) => AcquireStep::Ready(record),
                None if state.waiters.is_empty()
                    && state.total() < self.inner.config.max_size() =>
                {
                    state.creating += 1;
                    AcquireStep::Create
                }
                None => {
                    if state.waiters.len() >= self.inner.config.max_waiters() {
                        drop(state);
                        self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            max_waiters = self.inner.config.max_waiters(),
                            "connection wait queue is full, rejecting acquire"
                        );
                        return Err(DeskError::AcquireTimeout { waited_ms: 0 });
                    }
                    let (tx, rx) = oneshot::channel();
                    let id = state.next_waiter_id;
                    state.next_waiter_id += 1;
                    state.waiters.push_back(Waiter { id, tx });
                    replenish = state.total() < self.inner.config.max_size();
                    AcquireStep::Wait(WaitSlot {
                        inner: Arc::clone(&self.inner),
                        id,
                        rx,
                        armed: true,
                    })
                }
            }
        };

        for record in discarded {
            self.inner.retire(record);
        }
        if replenish {
            self.inner.spawn_replenish();
        }

        match step {
            AcquireStep::Ready(record) => Ok(self.lend(record)),
            AcquireStep::Create => self.create_and_lend().await,
            AcquireStep::Wait(slot) => self.wait_for_handoff(slot, started, deadline).await,
        }
    }

    async fn create_and_lend(&self) -> Result<PooledConnection> {
        let reservation = CreateReservation::new(&self.inner);
        match self.inner.open_record().await {
            Ok(record) => {
                let mut state = self.inner.state.lock();
                reservation.complete(&mut state);
                if state.shutting_down {
                    drop(state);
                    self.inner.retire(record);
                    return Err(DeskError::PoolShuttingDown);
                }
                state.busy.insert(record.id, BusyEntry::from_record(&record));
                drop(state);
                Ok(self.lend(record))
            }
            Err(e) => {
                let has_waiters = {
                    let mut state = self.inner.state.lock();
                    reservation.complete(&mut state);
                    !state.waiters.is_empty()
                };
                if has_waiters {
                    self.inner.spawn_replenish();
                }
                Err(e)
            }
        }
    }

    async fn wait_for_handoff(
        &self,
        mut slot: WaitSlot,
        started: Instant,
        deadline: Instant,
    ) -> Result<PooledConnection> {
        match tokio::time::timeout_at(deadline, &mut slot.rx).await {
            Ok(Ok(record)) => {
                slot.disarm();
                Ok(self.lend(record))
            }
            Ok(Err(_)) => {
                // sender dropped without a handoff: only happens when shutdown drains the queue
                slot.disarm();
                if self.is_shutting_down() {
                    Err(DeskError::PoolShuttingDown)
                } else {
                    Err(DeskError::AcquireTimeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                    })
                }
            }
            Err(_) => {
                if let Some(record) = slot.cancel() {
                    return Ok(self.lend(record));
                }
                let waited_ms = started.elapsed().as_millis() as u64;
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(waited_ms, "timed out waiting for a pooled connection");
                Err(DeskError::AcquireTimeout { waited_ms })
            }
        }
    }

    fn lend(&self, record: ConnectionRecord) -> PooledConnection {
        PooledConnection {
            record: Some(record),
            pool: Arc::clone(&self.inner),
            reusable: true,
        }
    }

    /// Close idle connections unused for longer than the idle timeout,
    /// never dropping below `min_size`. Returns how many were closed.
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout();
        let max_lifetime = self.inner.config.max_lifetime();

        let expired = {
            let mut state = self.inner.state.lock();
            let mut removable = state.total().saturating_sub(self.inner.config.min_size());
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut expired = Vec::new();

            // front of the deque holds the least recently used records
            for record in std::mem::take(&mut state.idle) {
                if record.connection.is_closed() {
                    removable = removable.saturating_sub(1);
                    expired.push(record);
                } else if removable > 0
                    && (record.idle_for(now) >= idle_timeout
                        || record.outlived(max_lifetime, now))
                {
                    removable -= 1;
                    expired.push(record);
                } else {
                    kept.push_back(record);
                }
            }
            state.idle = kept;
            expired
        };

        let count = expired.len();
        for record in expired {
            self.inner.close_now(record).await;
        }
        if count > 0 {
            tracing::debug!(closed = count, "reaped idle connections");
        }
        count
    }

    /// Open connections until the pool holds `min_size` again.
    /// Returns how many were opened.
    pub async fn ensure_min_size(&self) -> usize {
        let mut opened = 0;
        loop {
            let reservation = {
                let mut state = self.inner.state.lock();
                if state.shutting_down || state.total() >= self.inner.config.min_size() {
                    break;
                }
                state.creating += 1;
                CreateReservation::new(&self.inner)
            };
            match self.inner.open_record().await {
                Ok(record) => {
                    self.inner.admit(reservation, record);
                    opened += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to restore minimum pool size");
                    break;
                }
            }
        }
        opened
    }

    /// Shut the pool down.
    ///
    /// New and queued acquires fail with `PoolShuttingDown`, idle connections
    /// are closed at once, busy ones get the shutdown grace period to come back
    /// and are force-closed afterwards.
    pub async fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };

        tracing::info!(
            idle = idle.len(),
            rejected_waiters = waiters.len(),
            "shutting down connection pool"
        );
        drop(waiters);
        for record in idle {
            self.inner.close_now(record).await;
        }

        let grace_deadline = Instant::now() + self.inner.config.shutdown_grace();
        loop {
            let notified = self.inner.released.notified();
            if self.inner.state.lock().busy.is_empty() {
                break;
            }
            if tokio::time::timeout_at(grace_deadline, notified).await.is_err() {
                break;
            }
        }

        let forced: Vec<(u64, BusyEntry)> = self.inner.state.lock().busy.drain().collect();
        if !forced.is_empty() {
            tracing::warn!(
                count = forced.len(),
                "force-closing connections still in use after the shutdown grace period"
            );
        }
        for (id, entry) in forced {
            self.inner.closed.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = entry.connection.close().await {
                tracing::warn!(record_id = id, error = %e, "error force-closing connection");
            }
        }
        tracing::info!("connection pool closed");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats::new(
            state.total(),
            state.idle.len(),
            state.busy.len(),
            state.waiters.len(),
            self.inner.config.max_size(),
        )
        .with_lifetime_counters(
            self.inner.created.load(Ordering::Relaxed),
            self.inner.closed.load(Ordering::Relaxed),
            self.inner.timeouts.load(Ordering::Relaxed),
        )
    }

    /// Per-record bookkeeping, ordered by record id
    pub fn records(&self) -> Vec<RecordInfo> {
        let now = Instant::now();
        let state = self.inner.state.lock();
        let mut records: Vec<RecordInfo> = state
            .idle
            .iter()
            .map(|r| r.info(RecordState::Idle, now))
            .chain(state.busy.iter().map(|(id, entry)| entry.info(*id, now)))
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

/// A connection borrowed from the pool
///
/// Dropping it returns the connection on every exit path, including
/// errors and cancelled futures.
pub struct PooledConnection {
    record: Option<ConnectionRecord>,
    pool: Arc<PoolInner>,
    reusable: bool,
}

impl PooledConnection {
    fn record(&self) -> &ConnectionRecord {
        self.record.as_ref().expect("connection taken")
    }

    fn record_mut(&mut self) -> &mut ConnectionRecord {
        self.record.as_mut().expect("connection taken")
    }

    /// Pool-assigned record id
    pub fn id(&self) -> u64 {
        self.record().id
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.record().connection
    }

    pub fn query_count(&self) -> u64 {
        self.record().query_count
    }

    pub fn error_count(&self) -> u64 {
        self.record().error_count
    }

    pub fn record_success(&mut self) {
        self.record_mut().query_count += 1;
    }

    pub fn record_failure(&mut self) {
        let record = self.record_mut();
        record.query_count += 1;
        record.error_count += 1;
    }

    /// Return the connection as unusable: it is closed instead of reused.
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.record().connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.pool.release(record, self.reusable);
        }
    }
}
