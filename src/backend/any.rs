//! Connector that dispatches to the backend chosen at runtime

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use sqlx::postgres::PgConnection;

use crate::error::BackendError;

use super::{BackendConfig, Connector, PostgresConnector, RedisConnector};

/// A connection to whichever backend the settings selected.
pub enum AnyConnection {
    Redis(MultiplexedConnection),
    Postgres(PgConnection),
}

impl AnyConnection {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyConnection::Redis(_) => "redis",
            AnyConnection::Postgres(_) => "postgres",
        }
    }
}

/// Connector built from a [`BackendConfig`].
pub enum AnyConnector {
    Redis(RedisConnector),
    Postgres(PostgresConnector),
}

impl AnyConnector {
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        match config {
            BackendConfig::Redis(options) => Ok(AnyConnector::Redis(RedisConnector::new(
                options.clone(),
            )?)),
            BackendConfig::Postgres(options) => Ok(AnyConnector::Postgres(PostgresConnector::new(
                options.clone(),
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyConnector::Redis(_) => "redis",
            AnyConnector::Postgres(_) => "postgres",
        }
    }

    fn mismatch(&self, conn: &AnyConnection) -> BackendError {
        BackendError::Unavailable(format!(
            "{} connection handed to {} connector",
            conn.kind(),
            self.kind()
        ))
    }
}

#[async_trait]
impl Connector for AnyConnector {
    type Connection = AnyConnection;

    async fn connect(&self) -> Result<Self::Connection, BackendError> {
        match self {
            AnyConnector::Redis(c) => c.connect().await.map(AnyConnection::Redis),
            AnyConnector::Postgres(c) => c.connect().await.map(AnyConnection::Postgres),
        }
    }

    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), BackendError> {
        match (self, conn) {
            (AnyConnector::Redis(c), AnyConnection::Redis(raw)) => c.ping(raw).await,
            (AnyConnector::Postgres(c), AnyConnection::Postgres(raw)) => c.ping(raw).await,
            (_, conn) => Err(self.mismatch(conn)),
        }
    }

    async fn reconnect(&self, conn: &mut Self::Connection) -> Result<(), BackendError> {
        match (self, conn) {
            (AnyConnector::Redis(c), AnyConnection::Redis(raw)) => c.reconnect(raw).await,
            (AnyConnector::Postgres(c), AnyConnection::Postgres(raw)) => c.reconnect(raw).await,
            (_, conn) => Err(self.mismatch(conn)),
        }
    }

    async fn close(&self, conn: Self::Connection) {
        match (self, conn) {
            (AnyConnector::Redis(c), AnyConnection::Redis(raw)) => c.close(raw).await,
            (AnyConnector::Postgres(c), AnyConnection::Postgres(raw)) => c.close(raw).await,
            (_, conn) => drop(conn),
        }
    }

    fn describe(&self) -> String {
        match self {
            AnyConnector::Redis(c) => c.describe(),
            AnyConnector::Postgres(c) => c.describe(),
        }
    }
}
