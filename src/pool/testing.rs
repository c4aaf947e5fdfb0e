//! In-memory connector for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::backend::Connector;
use crate::error::BackendError;

pub(crate) struct CountingConnection {
    #[allow(dead_code)]
    pub(crate) serial: usize,
}

/// Connector whose connections always succeed; counts opens and closes
#[derive(Default)]
pub(crate) struct CountingConnector {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl CountingConnector {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    type Connection = CountingConnection;

    async fn connect(&self) -> Result<Self::Connection, BackendError> {
        let serial = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CountingConnection { serial })
    }

    async fn ping(&self, _conn: &mut Self::Connection) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&self, _conn: Self::Connection) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "counting://memory".to_string()
    }
}
