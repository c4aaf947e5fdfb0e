use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::backend::Connector;
use crate::pool::ConnectionPool;

/// Background task that borrows and returns a connection on a fixed period,
/// logging the pool counts after each round
pub struct ProbeTask<K: Connector> {
    pool: ConnectionPool<K>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl<K: Connector> ProbeTask<K> {
    pub fn new(
        pool: ConnectionPool<K>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            pool,
            interval,
            shutdown,
        }
    }

    /// Run the probe loop until shutdown is signalled or the pool closes
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            pool = %self.pool.option().name(),
            interval_secs = self.interval.as_secs(),
            "Probe task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Probe task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    if self.pool.is_closed() {
                        break;
                    }
                    self.probe_once().await;
                }
            }
        }

        tracing::info!("Probe task stopped");
    }

    /// Borrow one connection, hand it straight back, and log the outcome.
    /// Returns whether the borrow succeeded.
    pub async fn probe_once(&self) -> bool {
        let start = Instant::now();

        let ok = match self.pool.borrow().await {
            Ok(conn) => {
                let age_ms = conn.age().as_millis() as u64;
                conn.close().await;
                tracing::debug!(
                    borrow_ms = start.elapsed().as_millis() as u64,
                    connection_age_ms = age_ms,
                    "Probe borrow succeeded"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Probe borrow failed");
                false
            }
        };

        let stats = self.pool.stats();
        match serde_json::to_string(&stats) {
            Ok(json) => tracing::info!(stats = %json, "Pool stats"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize pool stats"),
        }

        ok
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pool::testing::CountingConnector;
    use crate::pool::PoolOption;

    async fn pool(min_idle: usize) -> ConnectionPool<Arc<CountingConnector>> {
        let option = PoolOption::new(min_idle, 4).unwrap();
        ConnectionPool::new(option, Arc::new(CountingConnector::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_probe_returns_connection() {
        let pool = pool(1).await;
        let (_tx, rx) = broadcast::channel(1);
        let task = ProbeTask::new(pool.clone(), Duration::from_secs(60), rx);

        assert!(task.probe_once().await);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.busy_count(), 0);
        assert_eq!(pool.connector().opened(), 1);
    }

    #[tokio::test]
    async fn test_probe_reports_failure_on_closed_pool() {
        let pool = pool(0).await;
        pool.close().await;

        let (_tx, rx) = broadcast::channel(1);
        let task = ProbeTask::new(pool.clone(), Duration::from_secs(60), rx);
        assert!(!task.probe_once().await);
    }

    #[tokio::test]
    async fn test_probe_stops_on_shutdown() {
        let pool = pool(1).await;
        let (tx, rx) = broadcast::channel(1);
        let task = ProbeTask::new(pool.clone(), Duration::from_secs(3600), rx);
        let handle = tokio::spawn(task.run());

        tokio::task::yield_now().await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Probe task should stop")
            .expect("Probe task should not panic");
    }
}
