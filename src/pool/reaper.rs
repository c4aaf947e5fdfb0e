use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::backend::Connector;

use super::connection_pool::PoolInner;

/// Background task that trims excess idle connections
pub(crate) struct IdleReaper<K: Connector> {
    pool: Weak<PoolInner<K>>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<K: Connector> IdleReaper<K> {
    pub(crate) fn new(
        pool: Weak<PoolInner<K>>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            interval,
            shutdown,
        }
    }

    /// Run until the pool is closed or dropped
    pub(crate) async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip immediate first tick
        timer.tick().await;

        tracing::debug!(
            interval_ms = self.interval.as_millis() as u64,
            "Idle reaper started"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    // A dropped sender means the pool itself is gone
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    let Some(pool) = self.pool.upgrade() else {
                        break;
                    };
                    let trimmed = pool.check_idle().await;
                    if trimmed > 0 {
                        let stats = pool.stats();
                        tracing::debug!(
                            pool = %stats.name,
                            trimmed = trimmed,
                            idle = stats.idle,
                            min_idle = stats.min_idle,
                            "Trimmed idle connections"
                        );
                    }
                }
            }
        }

        tracing::debug!("Idle reaper stopped");
    }
}
