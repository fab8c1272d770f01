//! # mysql-driver-pool
//!
//! Connection pool for MySQL with lifecycle management.
//!
//! ## Features
//!
//! - COM_RESET_CONNECTION on connection return
//! - Health checks via COM_PING on checkout
//! - Configurable min/max pool sizes
//! - Acquisition timeout, idle timeout and maximum lifetime
//! - Result sets and transactions that hand their connection back on drop
//!
//! A background reaper evicts idle and expired connections, but never one
//! that is still discarding the rows of a dropped result set.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_driver_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .min_connections(5)
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(300));
//!
//! let pool = Pool::new(connection_config, config).await?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Connection automatically returned to pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::{ConnectionInfo, ConnectionLifecycle};
pub use pool::{
    Pool, PoolBuilder, PoolStatus, PooledConnection, PooledResultSet, PooledTransaction,
};
