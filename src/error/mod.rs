//! Error types for the connection pool and its backends.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a backend connector.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Connect or ping did not finish in time
    #[error("Backend operation timed out after {0:?}")]
    Timeout(Duration),

    /// Backend refused the operation for a non-protocol reason
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`ConnectionPool`](crate::pool::ConnectionPool) operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Invalid pool option; never recovered
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    /// No idle connection and no capacity left to create one
    #[error("Connection pool exhausted (max_idle: {max_idle})")]
    PoolExhausted { max_idle: usize },

    /// Backend could not establish a new connection
    #[error("Failed to create connection: {0}")]
    ConnectionCreation(#[source] BackendError),

    /// Reconnect of a stale connection failed; the connection was discarded
    #[error("Reconnect failed after {attempts} attempts: {source}")]
    Reconnect {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// Liveness check failed; the connection was discarded
    #[error("Connection failed liveness check after {attempts} attempts")]
    Connectivity { attempts: u32 },
}

impl PoolError {
    /// Whether calling `borrow()` again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. }
                | PoolError::Reconnect { .. }
                | PoolError::Connectivity { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::PoolExhausted { max_idle: 4 };
        assert_eq!(format!("{}", err), "Connection pool exhausted (max_idle: 4)");

        let err = PoolError::Reconnect {
            attempts: 3,
            source: BackendError::Unavailable("refused".to_string()),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("refused"));

        let err = PoolError::ConnectionCreation(BackendError::Timeout(Duration::from_secs(5)));
        assert!(format!("{}", err).contains("timed out"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PoolError::PoolExhausted { max_idle: 1 }.is_retryable());
        assert!(PoolError::Connectivity { attempts: 3 }.is_retryable());
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(!PoolError::Configuration("bad".to_string()).is_retryable());
    }
}
