//! Scriptable in-memory connector shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dbpool::backend::Connector;
use dbpool::error::BackendError;
use dbpool::pool::{ConnectionPool, PoolOption};

#[derive(Debug)]
pub struct MockConnection {
    /// Order in which the connection was opened, starting at 1
    pub serial: usize,
    /// Number of successful in-place reconnects
    pub generation: usize,
}

#[derive(Default)]
pub struct MockConnector {
    next_serial: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_reconnect: AtomicBool,
    /// Number of upcoming pings that fail
    pub ping_failures: AtomicUsize,
    pub pings: AtomicUsize,
    pub reconnects: AtomicUsize,
    /// Delay applied to connect, ping and reconnect, in milliseconds
    io_delay_ms: AtomicU64,
    closed: Mutex<Vec<usize>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> usize {
        self.next_serial.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<usize> {
        self.closed.lock().clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reconnect(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_pings(&self, count: usize) {
        self.ping_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_io_delay(&self, delay: Duration) {
        self.io_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn io_delay(&self) {
        let delay_ms = self.io_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<Self::Connection, BackendError> {
        self.io_delay().await;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            serial,
            generation: 0,
        })
    }

    async fn ping(&self, _conn: &mut Self::Connection) -> Result<(), BackendError> {
        self.io_delay().await;
        self.pings.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .ping_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(BackendError::Timeout(Duration::from_millis(50)))
        } else {
            Ok(())
        }
    }

    async fn reconnect(&self, conn: &mut Self::Connection) -> Result<(), BackendError> {
        self.io_delay().await;
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("reconnect refused".to_string()));
        }
        conn.generation += 1;
        Ok(())
    }

    async fn close(&self, conn: Self::Connection) {
        self.closed.lock().push(conn.serial);
    }

    fn describe(&self) -> String {
        "mock://memory".to_string()
    }
}

/// Options with the reaper pushed out of the way of the test body
pub fn option(min_idle: usize, max_idle: usize) -> PoolOption {
    PoolOption::new(min_idle, max_idle)
        .unwrap()
        .with_check_interval(Duration::from_secs(3600))
}

pub async fn create_pool(
    option: PoolOption,
) -> (ConnectionPool<Arc<MockConnector>>, Arc<MockConnector>) {
    let connector = MockConnector::new();
    let pool = ConnectionPool::new(option, connector.clone())
        .await
        .expect("pool should start");
    (pool, connector)
}

/// Give spawned returns and closes a chance to run
pub async fn drain_spawned() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Yield until spawned returns have settled the busy count
pub async fn settle<K: Connector>(pool: &ConnectionPool<K>) {
    for _ in 0..100 {
        if pool.busy_count() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}
