//! Pool statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time snapshot of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub idle: usize,
    pub busy: usize,
    pub min_idle: usize,
    pub max_idle: usize,
    pub closed: bool,
    /// Connections established by the factory (warm-up and on demand)
    pub created: u64,
    /// Borrows served from the idle queue
    pub reused: u64,
    pub discarded: u64,
    /// Successful reconnects of stale connections
    pub reconnects: u64,
    /// Borrows rejected for lack of capacity
    pub exhausted: u64,
}

impl PoolStats {
    /// Connections currently accounted to the pool
    pub fn total(&self) -> usize {
        self.idle + self.busy
    }
}

/// Lifetime counters kept alongside the pool state
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) created: AtomicU64,
    pub(crate) reused: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) reconnects: AtomicU64,
    pub(crate) exhausted: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
