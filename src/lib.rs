// Core pool
pub mod pool;

// Connection backends
pub mod backend;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod tasks;

pub use backend::Connector;
pub use error::{BackendError, PoolError};
pub use pool::{ConnectionPool, PoolOption, PooledConnection};
