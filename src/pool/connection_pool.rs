//! Bounded connection pool.
//!
//! Idle connections wait in a FIFO queue; connections on loan are tracked
//! by identity in a second queue. `idle_count` and `busy_count` are updated
//! under a single lock that is never held across backend I/O. A connection
//! being checked or reconnected stays counted where it came from until the
//! check settles, so the `idle + busy <= max_idle` bound holds throughout.
//! The guard records which count it holds in the meantime and gives it
//! back if the borrow or return is cancelled.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::Connector;
use crate::error::{BackendError, PoolError, Result};
use crate::metrics::{DiscardReason, PoolMetrics};

use super::connection::{Hold, IdleConnection, PooledConnection};
use super::queue::BoundedQueue;
use super::reaper::IdleReaper;
use super::stats::{PoolCounters, PoolStats};
use super::PoolOption;

#[derive(Debug, Default)]
pub(crate) struct PoolState {
    idle_count: usize,
    busy_count: usize,
    closed: bool,
}

/// Loan record kept in the busy queue
struct Loan {
    id: Uuid,
    lent_at: Instant,
}

/// Busy slot reserved while a new connection is opened; released on drop
/// unless handed over to the connection's guard.
struct BusySlot<'a, K: Connector> {
    pool: &'a PoolInner<K>,
    held: bool,
}

impl<K: Connector> BusySlot<'_, K> {
    fn hand_over(mut self) {
        self.held = false;
    }
}

impl<K: Connector> Drop for BusySlot<'_, K> {
    fn drop(&mut self) {
        if self.held {
            self.pool.release_busy();
        }
    }
}

/// Bounded pool of reusable backend connections.
///
/// Cloning is cheap and every clone refers to the same pool.
///
/// # Example
///
/// ```no_run
/// use dbpool::backend::{RedisConnectOptions, RedisConnector};
/// use dbpool::pool::{ConnectionPool, PoolOption};
///
/// # async fn run() -> anyhow::Result<()> {
/// let connector = RedisConnector::new(RedisConnectOptions::default())?;
/// let pool = ConnectionPool::new(PoolOption::new(2, 8)?, connector).await?;
///
/// let conn = pool.borrow().await?;
/// // ... use `conn` as a `MultiplexedConnection` ...
/// conn.close().await;
///
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<K: Connector> {
    inner: Arc<PoolInner<K>>,
}

pub(crate) struct PoolInner<K: Connector> {
    option: PoolOption,
    connector: K,
    state: Mutex<PoolState>,
    idle: BoundedQueue<IdleConnection<K::Connection>>,
    busy: BoundedQueue<Loan>,
    counters: PoolCounters,
    shutdown: watch::Sender<bool>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<PoolInner<K>>,
}

impl<K: Connector> ConnectionPool<K> {
    /// Validate `option`, open `min_idle` connections and start the idle
    /// reaper.
    pub async fn new(option: PoolOption, connector: K) -> Result<Self> {
        option.validate()?;

        let check_interval = option.check_interval();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let inner = Arc::new_cyclic(|self_ref| PoolInner {
            idle: BoundedQueue::new(option.max_idle()),
            busy: BoundedQueue::new(option.max_idle()),
            option,
            connector,
            state: Mutex::new(PoolState::default()),
            counters: PoolCounters::default(),
            shutdown,
            reaper: Mutex::new(None),
            self_ref: self_ref.clone(),
        });

        inner.warm_up().await?;

        let reaper = IdleReaper::new(Arc::downgrade(&inner), check_interval, shutdown_rx);
        let handle = tokio::spawn(reaper.run());
        *inner.reaper.lock() = Some(handle);

        tracing::info!(
            pool = %inner.option.name(),
            backend = %inner.connector.describe(),
            min_idle = inner.option.min_idle(),
            max_idle = inner.option.max_idle(),
            max_age_secs = inner.option.max_age().as_secs_f64(),
            "Connection pool created"
        );

        Ok(Self { inner })
    }

    /// Borrow a connection without waiting for capacity.
    ///
    /// Serves the oldest idle connection (refreshed first if it exceeded
    /// `max_age`, then liveness-checked), or opens a new one while below
    /// `max_idle`. A connection failing reconnect or the liveness check is
    /// discarded before the error is returned; no second attempt is made.
    pub async fn borrow(&self) -> Result<PooledConnection<K>> {
        self.inner.borrow().await
    }

    /// Hand a borrowed connection back; same as [`PooledConnection::close`].
    pub async fn return_connection(&self, conn: PooledConnection<K>) {
        self.inner.return_connection(conn).await
    }

    /// Close the pool: stop the reaper and discard every idle connection.
    ///
    /// Connections on loan are discarded as they come back. Idempotent.
    pub async fn close(&self) {
        self.inner.close().await
    }

    /// Run one idle-trim sweep now; returns the number of connections closed.
    pub async fn check_idle(&self) -> usize {
        self.inner.check_idle().await
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle_count
    }

    pub fn busy_count(&self) -> usize {
        self.inner.state.lock().busy_count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn option(&self) -> &PoolOption {
        &self.inner.option
    }

    pub fn connector(&self) -> &K {
        &self.inner.connector
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl<K: Connector> Clone for ConnectionPool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Connector> PoolInner<K> {
    async fn warm_up(&self) -> Result<()> {
        for _ in 0..self.option.min_idle() {
            let raw = match self.connector.connect().await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!(
                        pool = %self.option.name(),
                        error = %e,
                        "Failed to open initial connections"
                    );
                    self.drain_idle(DiscardReason::PoolClosed).await;
                    return Err(PoolError::ConnectionCreation(e));
                }
            };
            self.record_created();

            let rejected = {
                let mut state = self.state.lock();
                let rejected = match self.idle.try_push(IdleConnection::new(raw)) {
                    Ok(()) => {
                        state.idle_count += 1;
                        None
                    }
                    Err(idle) => Some(idle),
                };
                self.publish_counts(&state);
                rejected
            };
            if let Some(idle) = rejected {
                self.discard_raw(idle.id, idle.raw, DiscardReason::Overflow).await;
            }
        }
        Ok(())
    }

    pub(crate) async fn borrow(&self) -> Result<PooledConnection<K>> {
        let started = Instant::now();
        let result = self.try_borrow().await;

        let outcome = match &result {
            Ok(_) => "served",
            Err(PoolError::PoolExhausted { .. }) => "exhausted",
            Err(PoolError::PoolClosed) => "closed",
            Err(_) => "failed",
        };
        PoolMetrics::record_borrow(self.option.name(), outcome, started.elapsed());

        result
    }

    async fn try_borrow(&self) -> Result<PooledConnection<K>> {
        let popped = {
            let state = self.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            // Popped under the state lock so a sweep sees a stable queue
            self.idle.try_pop()
        };

        match popped {
            Some(idle) => self.serve_idle(idle).await,
            None => self.serve_new().await,
        }
    }

    async fn serve_idle(&self, idle: IdleConnection<K::Connection>) -> Result<PooledConnection<K>> {
        let mut conn = PooledConnection::checked_out(idle, self.self_ref.clone(), Hold::Idle);

        if self.is_expired(&conn) {
            tracing::debug!(
                pool = %self.option.name(),
                connection_id = %conn.id,
                age_ms = conn.age().as_millis() as u64,
                "Idle connection exceeded max age, reconnecting"
            );
            if let Err(e) = self.force_reconnect(&mut conn).await {
                self.settle(&mut conn);
                return Err(e);
            }
        }

        if !self.test(&mut conn).await {
            self.discard(&mut conn, DiscardReason::PingFailed).await;
            self.settle(&mut conn);
            return Err(PoolError::Connectivity {
                attempts: self.option.retry().attempts,
            });
        }

        self.lend(conn).await.map(|conn| {
            PoolCounters::incr(&self.counters.reused);
            conn
        })
    }

    async fn serve_new(&self) -> Result<PooledConnection<K>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            if state.idle_count + state.busy_count >= self.option.max_idle() {
                PoolCounters::incr(&self.counters.exhausted);
                tracing::debug!(
                    pool = %self.option.name(),
                    idle = state.idle_count,
                    busy = state.busy_count,
                    "Connection pool exhausted"
                );
                return Err(PoolError::PoolExhausted {
                    max_idle: self.option.max_idle(),
                });
            }
            // Reserve the slot before connecting so concurrent borrowers
            // cannot overshoot max_idle
            state.busy_count += 1;
            self.publish_counts(&state);
        }
        let slot = BusySlot {
            pool: self,
            held: true,
        };

        let raw = match self.connector.connect().await {
            Ok(raw) => raw,
            Err(e) => {
                drop(slot);
                tracing::warn!(
                    pool = %self.option.name(),
                    error = %e,
                    "Failed to create connection"
                );
                return Err(PoolError::ConnectionCreation(e));
            }
        };
        self.record_created();

        // The guard takes over the reserved slot
        slot.hand_over();
        let mut conn =
            PooledConnection::checked_out(IdleConnection::new(raw), self.self_ref.clone(), Hold::Busy);
        if !self.test(&mut conn).await {
            self.discard(&mut conn, DiscardReason::PingFailed).await;
            self.settle(&mut conn);
            return Err(PoolError::Connectivity {
                attempts: self.option.retry().attempts,
            });
        }

        self.lend(conn).await
    }

    /// Record `conn` as on loan, moving the count its guard holds to busy.
    async fn lend(&self, mut conn: PooledConnection<K>) -> Result<PooledConnection<K>> {
        let refused = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut conn.hold, Hold::None) {
                Hold::Idle => state.idle_count = state.idle_count.saturating_sub(1),
                Hold::Busy => state.busy_count = state.busy_count.saturating_sub(1),
                Hold::Loan | Hold::None => {}
            }

            let refused = if state.closed {
                Some((PoolError::PoolClosed, DiscardReason::PoolClosed))
            } else {
                let loan = Loan {
                    id: conn.id,
                    lent_at: Instant::now(),
                };
                match self.busy.try_push(loan) {
                    Ok(()) => {
                        state.busy_count += 1;
                        conn.hold = Hold::Loan;
                        None
                    }
                    Err(_) => Some((
                        PoolError::PoolExhausted {
                            max_idle: self.option.max_idle(),
                        },
                        DiscardReason::Overflow,
                    )),
                }
            };
            self.publish_counts(&state);
            refused
        };

        if let Some((error, reason)) = refused {
            self.discard(&mut conn, reason).await;
            return Err(error);
        }

        tracing::debug!(
            pool = %self.option.name(),
            connection_id = %conn.id,
            "Connection lent out"
        );
        Ok(conn)
    }

    pub(crate) async fn return_connection(&self, mut conn: PooledConnection<K>) {
        let Some(loan) = self.busy.remove_first(|loan| loan.id == conn.id) else {
            tracing::warn!(
                pool = %self.option.name(),
                connection_id = %conn.id,
                "Connection already returned to pool"
            );
            // Not tracked by this pool; close it without touching the counts
            conn.hold = Hold::None;
            if let Some(raw) = conn.raw.take() {
                self.connector.close(raw).await;
            }
            return;
        };
        // The loan record is gone but the busy count stays with the guard
        conn.hold = Hold::Busy;
        let held_ms = loan.lent_at.elapsed().as_millis() as u64;

        if conn.raw.is_none() {
            // Already closed by a failed reconnect while on loan
            self.settle(&mut conn);
            return;
        }

        if self.is_closed() {
            self.discard(&mut conn, DiscardReason::PoolClosed).await;
            self.settle(&mut conn);
            return;
        }

        if self.is_expired(&conn) && self.force_reconnect(&mut conn).await.is_err() {
            self.settle(&mut conn);
            return;
        }

        let id = conn.id;
        let Some(idle) = conn.into_idle() else {
            self.release_busy();
            return;
        };

        let rejected = {
            let mut state = self.state.lock();
            state.busy_count = state.busy_count.saturating_sub(1);
            let rejected = if state.closed {
                Some((idle, DiscardReason::PoolClosed))
            } else {
                match self.idle.try_push(idle) {
                    Ok(()) => {
                        state.idle_count += 1;
                        None
                    }
                    Err(idle) => Some((idle, DiscardReason::Overflow)),
                }
            };
            self.publish_counts(&state);
            rejected
        };

        match rejected {
            Some((idle, reason)) => self.discard_raw(idle.id, idle.raw, reason).await,
            None => tracing::debug!(
                pool = %self.option.name(),
                connection_id = %id,
                held_ms = held_ms,
                "Connection returned to pool"
            ),
        }
    }

    pub(crate) async fn close(&self) {
        let first_close = {
            let mut state = self.state.lock();
            let first_close = !state.closed;
            state.closed = true;
            first_close
        };

        self.shutdown.send_replace(true);
        let discarded = self.drain_idle(DiscardReason::PoolClosed).await;

        let reaper = self.reaper.lock().take();
        if let Some(handle) = reaper {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Idle reaper ended abnormally");
            }
        }

        if first_close {
            tracing::info!(
                pool = %self.option.name(),
                discarded = discarded,
                busy = self.state.lock().busy_count,
                "Connection pool closed"
            );
        }
    }

    pub(crate) async fn check_idle(&self) -> usize {
        let victims = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }

            // A connection checked out by a borrower is still in idle_count
            // but is leaving; only what is queued counts toward the floor
            let queued = self.idle.len();
            let target = self.option.trim_count(queued);
            let mut victims = Vec::with_capacity(target);
            while victims.len() < target && queued - victims.len() > self.option.min_idle() {
                match self.idle.try_pop() {
                    Some(idle) => {
                        state.idle_count -= 1;
                        victims.push(idle);
                    }
                    None => break,
                }
            }
            self.publish_counts(&state);
            victims
        };

        let trimmed = victims.len();
        for idle in victims {
            self.discard_raw(idle.id, idle.raw, DiscardReason::IdleTrim).await;
        }
        trimmed
    }

    pub(crate) async fn force_reconnect(&self, conn: &mut PooledConnection<K>) -> Result<()> {
        let retry = self.option.retry();
        let mut backoff = retry.backoff();
        let mut last_error = None;

        for attempt in 1..=retry.attempts {
            // Reconnect in place so a cancelled attempt leaves the connection
            // with its guard
            let outcome = match conn.raw.as_mut() {
                Some(raw) => self.connector.reconnect(raw).await,
                None => self.connector.connect().await.map(|raw| {
                    conn.raw = Some(raw);
                }),
            };

            match outcome {
                Ok(()) => {
                    conn.last_connected_at = Instant::now();
                    PoolCounters::incr(&self.counters.reconnects);
                    PoolMetrics::record_reconnect(self.option.name(), true);
                    tracing::debug!(
                        pool = %self.option.name(),
                        connection_id = %conn.id,
                        attempt = attempt,
                        "Connection reconnected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        pool = %self.option.name(),
                        connection_id = %conn.id,
                        attempt = attempt,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < retry.attempts {
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        }

        PoolMetrics::record_reconnect(self.option.name(), false);
        self.discard(conn, DiscardReason::ReconnectFailed).await;
        Err(PoolError::Reconnect {
            attempts: retry.attempts,
            source: last_error
                .unwrap_or_else(|| BackendError::Unavailable("no reconnect attempted".to_string())),
        })
    }

    pub(crate) async fn test(&self, conn: &mut PooledConnection<K>) -> bool {
        let retry = self.option.retry();
        let mut backoff = retry.backoff();
        let Some(raw) = conn.raw.as_mut() else {
            return false;
        };

        for attempt in 1..=retry.attempts {
            match self.connector.ping(raw).await {
                Ok(()) => {
                    conn.last_connected_at = Instant::now();
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        pool = %self.option.name(),
                        connection_id = %conn.id,
                        attempt = attempt,
                        error = %e,
                        "Liveness check failed"
                    );
                    if attempt < retry.attempts {
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        }
        false
    }

    pub(crate) fn is_expired(&self, conn: &PooledConnection<K>) -> bool {
        conn.last_connected_at.elapsed() > self.option.max_age()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Settle a loan whose connection is gone without an async return.
    pub(crate) fn forget_loan(&self, id: Uuid) {
        if self.busy.remove_first(|loan| loan.id == id).is_some() {
            self.release_busy();
        }
    }

    /// Give back the count a guard holds and clear its hold.
    fn settle(&self, conn: &mut PooledConnection<K>) {
        let hold = std::mem::replace(&mut conn.hold, Hold::None);
        self.release_hold(conn.id, hold);
    }

    pub(crate) fn release_hold(&self, id: Uuid, hold: Hold) {
        match hold {
            Hold::Idle => self.forget_idle(),
            Hold::Busy => self.release_busy(),
            Hold::Loan => self.forget_loan(id),
            Hold::None => {}
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            name: self.option.name().to_string(),
            idle: state.idle_count,
            busy: state.busy_count,
            min_idle: self.option.min_idle(),
            max_idle: self.option.max_idle(),
            closed: state.closed,
            created: PoolCounters::get(&self.counters.created),
            reused: PoolCounters::get(&self.counters.reused),
            discarded: PoolCounters::get(&self.counters.discarded),
            reconnects: PoolCounters::get(&self.counters.reconnects),
            exhausted: PoolCounters::get(&self.counters.exhausted),
        }
    }

    fn release_busy(&self) {
        let mut state = self.state.lock();
        state.busy_count = state.busy_count.saturating_sub(1);
        self.publish_counts(&state);
    }

    fn forget_idle(&self) {
        let mut state = self.state.lock();
        state.idle_count = state.idle_count.saturating_sub(1);
        self.publish_counts(&state);
    }

    async fn drain_idle(&self, reason: DiscardReason) -> usize {
        let drained = {
            let mut state = self.state.lock();
            let drained = self.idle.drain();
            state.idle_count = state.idle_count.saturating_sub(drained.len());
            self.publish_counts(&state);
            drained
        };

        let count = drained.len();
        for idle in drained {
            self.discard_raw(idle.id, idle.raw, reason).await;
        }
        count
    }

    async fn discard(&self, conn: &mut PooledConnection<K>, reason: DiscardReason) {
        if let Some(raw) = conn.raw.take() {
            self.discard_raw(conn.id, raw, reason).await;
        }
    }

    pub(crate) async fn discard_raw(&self, id: Uuid, raw: K::Connection, reason: DiscardReason) {
        self.connector.close(raw).await;
        PoolCounters::incr(&self.counters.discarded);
        PoolMetrics::record_discarded(self.option.name(), reason);
        tracing::debug!(
            pool = %self.option.name(),
            connection_id = %id,
            reason = reason.as_str(),
            "Connection discarded"
        );
    }

    fn record_created(&self) {
        PoolCounters::incr(&self.counters.created);
        PoolMetrics::record_created(self.option.name());
    }

    fn publish_counts(&self, state: &PoolState) {
        PoolMetrics::set_counts(self.option.name(), state.idle_count, state.busy_count);
    }
}
