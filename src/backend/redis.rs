//! Redis backend connector

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use serde::Deserialize;

use crate::error::BackendError;

use super::{mask_url, with_timeout, Connector};

/// Options for connecting to Redis.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConnectOptions {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for one `PING` in milliseconds
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_ping_timeout_ms() -> u64 {
    1_000
}

impl Default for RedisConnectOptions {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

/// Opens one multiplexed Redis connection per pooled connection.
pub struct RedisConnector {
    client: Client,
    options: RedisConnectOptions,
}

impl RedisConnector {
    pub fn new(options: RedisConnectOptions) -> Result<Self, BackendError> {
        let client = Client::open(options.url.as_str())?;
        Ok(Self { client, options })
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.options.connect_timeout_ms)
    }

    fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.options.ping_timeout_ms)
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = MultiplexedConnection;

    async fn connect(&self) -> Result<Self::Connection, BackendError> {
        with_timeout(
            self.connect_timeout(),
            self.client.get_multiplexed_async_connection(),
        )
        .await
    }

    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), BackendError> {
        let _: String = with_timeout(
            self.ping_timeout(),
            redis::cmd("PING").query_async(conn),
        )
        .await?;
        Ok(())
    }

    async fn close(&self, conn: Self::Connection) {
        // The socket is shut down once the last handle is dropped
        drop(conn);
    }

    fn describe(&self) -> String {
        mask_url(&self.options.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_creation() {
        let connector = RedisConnector::new(RedisConnectOptions::default()).unwrap();
        assert_eq!(connector.describe(), "redis://localhost:6379");
        assert_eq!(connector.connect_timeout(), Duration::from_secs(5));
        assert_eq!(connector.ping_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let options = RedisConnectOptions {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RedisConnector::new(options),
            Err(BackendError::Redis(_))
        ));
    }

    #[test]
    fn test_describe_masks_password() {
        let options = RedisConnectOptions {
            url: "redis://:hunter2@cache:6379".to_string(),
            ..Default::default()
        };
        let connector = RedisConnector::new(options).unwrap();
        assert!(!connector.describe().contains("hunter2"));
    }
}
