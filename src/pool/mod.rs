//! Bounded connection pool
//!
//! - `ConnectionPool`: borrow/return protocol, counts and shutdown
//! - `PooledConnection`: loan guard that returns itself on close
//! - `PoolOption`: validated sizing and lifecycle options
//! - `RetryPolicy`: bounded local retries for reconnect and ping

mod connection;
mod connection_pool;
mod option;
mod queue;
mod reaper;
mod retry;
mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::PooledConnection;
pub use connection_pool::ConnectionPool;
pub use option::{PoolOption, DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_AGE, DEFAULT_TRIM_RATIO};
pub use retry::{Backoff, RetryPolicy};
pub use stats::PoolStats;
