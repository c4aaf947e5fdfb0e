//! Borrowed connection guard

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::Connector;
use crate::error::{PoolError, Result};
use crate::metrics::DiscardReason;

use super::connection_pool::PoolInner;

/// A connection resting in the idle queue.
pub(crate) struct IdleConnection<C> {
    pub(crate) id: Uuid,
    pub(crate) raw: C,
    pub(crate) last_connected_at: Instant,
}

impl<C> IdleConnection<C> {
    pub(crate) fn new(raw: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw,
            last_connected_at: Instant::now(),
        }
    }
}

/// Which pool count a guard currently occupies.
///
/// A guard between two states of the pool (checked out of the idle queue,
/// freshly connected, or on its way back) still holds one count. Dropping
/// the guard releases whatever it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hold {
    /// Counted in `idle_count` but no longer queued
    Idle,
    /// Counted in `busy_count` without a loan record
    Busy,
    /// Counted in `busy_count` with a loan record in the busy queue
    Loan,
    None,
}

/// A connection on loan from a [`ConnectionPool`](super::ConnectionPool).
///
/// Dereferences to the backend connection. [`close`](Self::close) hands it
/// back to the pool instead of closing the socket; dropping the guard does
/// the same on the current tokio runtime.
///
/// # Panics
///
/// Dereferencing panics once the backend connection has been discarded by
/// a failed [`force_reconnect`](Self::force_reconnect). Check
/// [`is_discarded`](Self::is_discarded) before touching the connection
/// again after a reconnect error.
pub struct PooledConnection<K: Connector> {
    pub(crate) id: Uuid,
    pub(crate) raw: Option<K::Connection>,
    pub(crate) last_connected_at: Instant,
    pub(crate) hold: Hold,
    pool: Weak<PoolInner<K>>,
}

impl<K: Connector> PooledConnection<K> {
    pub(crate) fn checked_out(
        idle: IdleConnection<K::Connection>,
        pool: Weak<PoolInner<K>>,
        hold: Hold,
    ) -> Self {
        Self {
            id: idle.id,
            raw: Some(idle.raw),
            last_connected_at: idle.last_connected_at,
            hold,
            pool,
        }
    }

    /// Take the connection back for the idle queue. The caller moves the
    /// count itself, so the guard gives up its hold.
    pub(crate) fn into_idle(mut self) -> Option<IdleConnection<K::Connection>> {
        self.hold = Hold::None;
        let raw = self.raw.take()?;
        Some(IdleConnection {
            id: self.id,
            raw,
            last_connected_at: self.last_connected_at,
        })
    }

    /// Identity used by the pool's loan bookkeeping
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Last successful connect, reconnect or liveness check
    pub fn last_connected_at(&self) -> Instant {
        self.last_connected_at
    }

    pub fn age(&self) -> Duration {
        self.last_connected_at.elapsed()
    }

    /// Whether the owning pool no longer exists
    pub fn is_detached(&self) -> bool {
        self.pool.strong_count() == 0
    }

    /// Whether the backend connection was closed by a failed reconnect
    pub fn is_discarded(&self) -> bool {
        self.raw.is_none()
    }

    /// Whether the connection is older than the pool's `max_age`.
    ///
    /// A detached connection never expires.
    pub fn is_max_age_expired(&self) -> bool {
        match self.pool.upgrade() {
            Some(pool) => pool.is_expired(self),
            None => false,
        }
    }

    /// Re-establish the backend connection using the pool's retry policy.
    ///
    /// On exhaustion the backend connection is closed and
    /// [`PoolError::Reconnect`] is returned; the loan is settled when the
    /// guard is closed or dropped. The guard must not be dereferenced after
    /// that, see [`is_discarded`](Self::is_discarded).
    pub async fn force_reconnect(&mut self) -> Result<()> {
        match self.pool.upgrade() {
            Some(pool) => pool.force_reconnect(self).await,
            None => Err(PoolError::PoolClosed),
        }
    }

    /// Liveness check using the pool's retry policy.
    pub async fn test(&mut self) -> bool {
        match self.pool.upgrade() {
            Some(pool) => pool.test(self).await,
            None => false,
        }
    }

    /// Return the connection to its pool, or close it when detached.
    pub async fn close(mut self) {
        match self.pool.upgrade() {
            Some(pool) => pool.return_connection(self).await,
            None => drop(self.raw.take()),
        }
    }
}

impl<K: Connector> Deref for PooledConnection<K> {
    type Target = K::Connection;

    fn deref(&self) -> &Self::Target {
        self.raw.as_ref().expect("connection already discarded")
    }
}

impl<K: Connector> DerefMut for PooledConnection<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.raw.as_mut().expect("connection already discarded")
    }
}

impl<K: Connector> fmt::Debug for PooledConnection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("last_connected_at", &self.last_connected_at)
            .field("discarded", &self.raw.is_none())
            .finish()
    }
}

impl<K: Connector> Drop for PooledConnection<K> {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let hold = std::mem::replace(&mut self.hold, Hold::None);
        let raw = self.raw.take();

        if hold != Hold::Loan {
            // Dropped before the pool settled it, e.g. a cancelled borrow
            pool.release_hold(self.id, hold);
            if let Some(raw) = raw {
                close_in_background(pool, self.id, raw);
            }
            return;
        }

        let Some(raw) = raw else {
            // Discarded while on loan; only the loan record is left
            pool.forget_loan(self.id);
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let id = self.id;
                let last_connected_at = self.last_connected_at;
                let weak = self.pool.clone();
                handle.spawn(async move {
                    let orphan = PooledConnection {
                        id,
                        raw: Some(raw),
                        last_connected_at,
                        hold: Hold::Loan,
                        pool: weak,
                    };
                    pool.return_connection(orphan).await;
                });
            }
            Err(_) => {
                // No runtime to run the async return on
                pool.forget_loan(self.id);
                drop(raw);
            }
        }
    }
}

/// Close a connection whose guard went away before the pool settled it.
fn close_in_background<K: Connector>(pool: Arc<PoolInner<K>>, id: Uuid, raw: K::Connection) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                pool.discard_raw(id, raw, DiscardReason::Cancelled).await;
            });
        }
        Err(_) => drop(raw),
    }
}
