//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    POOL_BORROWS_TOTAL, POOL_BORROW_LATENCY, POOL_BUSY_CONNECTIONS, POOL_CONNECTIONS_CREATED_TOTAL,
    POOL_CONNECTIONS_DISCARDED_TOTAL, POOL_IDLE_CONNECTIONS, POOL_RECONNECTS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Why the pool closed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    ReconnectFailed,
    PingFailed,
    PoolClosed,
    IdleTrim,
    Overflow,
    /// Guard dropped while the pool was still checking or returning it
    Cancelled,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::ReconnectFailed => "reconnect_failed",
            DiscardReason::PingFailed => "ping_failed",
            DiscardReason::PoolClosed => "pool_closed",
            DiscardReason::IdleTrim => "idle_trim",
            DiscardReason::Overflow => "overflow",
            DiscardReason::Cancelled => "cancelled",
        }
    }
}

/// Helper struct for recording pool metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Publish the current idle/busy counts
    pub fn set_counts(pool: &str, idle: usize, busy: usize) {
        POOL_IDLE_CONNECTIONS
            .with_label_values(&[pool])
            .set(idle as i64);
        POOL_BUSY_CONNECTIONS
            .with_label_values(&[pool])
            .set(busy as i64);
    }

    pub fn record_created(pool: &str) {
        POOL_CONNECTIONS_CREATED_TOTAL.with_label_values(&[pool]).inc();
    }

    pub fn record_discarded(pool: &str, reason: DiscardReason) {
        POOL_CONNECTIONS_DISCARDED_TOTAL
            .with_label_values(&[pool, reason.as_str()])
            .inc();
    }

    pub fn record_reconnect(pool: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        POOL_RECONNECTS_TOTAL.with_label_values(&[pool, result]).inc();
    }

    /// Record a borrow outcome and, for served borrows, its latency
    pub fn record_borrow(pool: &str, outcome: &str, elapsed: Duration) {
        POOL_BORROWS_TOTAL.with_label_values(&[pool, outcome]).inc();
        if outcome == "served" {
            POOL_BORROW_LATENCY
                .with_label_values(&[pool])
                .observe(elapsed.as_secs_f64());
        }
    }
}
