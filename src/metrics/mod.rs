//! Prometheus metrics for connection pools.
//!
//! Every metric carries a `pool` label so several pools in one process can
//! be told apart:
//! - Connection gauges (idle, busy)
//! - Lifecycle counters (created, discarded by reason, reconnects)
//! - Borrow outcomes and latency

mod helpers;

pub use helpers::{encode_metrics, DiscardReason, PoolMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "dbpool";

lazy_static! {
    /// Idle connections currently held by the pool
    pub static ref POOL_IDLE_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_idle_connections", METRIC_PREFIX),
        "Number of idle connections in the pool",
        &["pool"]
    ).unwrap();

    /// Connections currently on loan
    pub static ref POOL_BUSY_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_busy_connections", METRIC_PREFIX),
        "Number of connections lent out to callers",
        &["pool"]
    ).unwrap();

    pub static ref POOL_CONNECTIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_created_total", METRIC_PREFIX),
        "Total backend connections established",
        &["pool"]
    ).unwrap();

    pub static ref POOL_CONNECTIONS_DISCARDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_discarded_total", METRIC_PREFIX),
        "Total connections closed by the pool",
        &["pool", "reason"]
    ).unwrap();

    pub static ref POOL_RECONNECTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_reconnects_total", METRIC_PREFIX),
        "Total reconnect sequences for stale connections",
        &["pool", "result"]
    ).unwrap();

    /// Borrow outcomes (served, exhausted, closed, failed)
    pub static ref POOL_BORROWS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_borrows_total", METRIC_PREFIX),
        "Total borrow attempts by outcome",
        &["pool", "outcome"]
    ).unwrap();

    /// Time spent inside `borrow()`, including reconnect and liveness checks
    pub static ref POOL_BORROW_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_borrow_latency_seconds", METRIC_PREFIX),
        "Borrow latency in seconds",
        &["pool"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();
}
