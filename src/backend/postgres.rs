//! PostgreSQL backend connector.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use crate::error::BackendError;

use super::{with_timeout, Connector};

/// Options for connecting to PostgreSQL.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConnectOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for one liveness ping in milliseconds
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_username() -> String {
    "postgres".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_ping_timeout_ms() -> u64 {
    1_000
}

impl Default for PostgresConnectOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: None,
            database: None,
            application_name: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

impl PostgresConnectOptions {
    fn to_connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);

        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        if let Some(application_name) = &self.application_name {
            options = options.application_name(application_name);
        }
        options
    }
}

/// Opens one dedicated `PgConnection` per pooled connection.
pub struct PostgresConnector {
    connect_options: PgConnectOptions,
    options: PostgresConnectOptions,
}

impl PostgresConnector {
    pub fn new(options: PostgresConnectOptions) -> Self {
        Self {
            connect_options: options.to_connect_options(),
            options,
        }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<Self::Connection, BackendError> {
        let timeout = Duration::from_millis(self.options.connect_timeout_ms);
        with_timeout(timeout, PgConnection::connect_with(&self.connect_options)).await
    }

    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), BackendError> {
        let timeout = Duration::from_millis(self.options.ping_timeout_ms);
        with_timeout(timeout, conn.ping()).await
    }

    async fn close(&self, conn: Self::Connection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "PostgreSQL connection did not close cleanly");
        }
    }

    fn describe(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.options.username,
            self.options.host,
            self.options.port,
            self.options.database.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = PostgresConnectOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 5432);
        assert_eq!(options.username, "postgres");
        assert!(options.password.is_none());
        assert_eq!(options.ping_timeout_ms, 1_000);
    }

    #[test]
    fn test_describe_omits_password() {
        let connector = PostgresConnector::new(PostgresConnectOptions {
            password: Some("secret123".to_string()),
            database: Some("orders".to_string()),
            ..Default::default()
        });

        let description = connector.describe();
        assert_eq!(description, "postgres://postgres@localhost:5432/orders");
        assert!(!description.contains("secret123"));
    }
}
