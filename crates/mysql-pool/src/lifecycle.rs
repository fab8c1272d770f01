//! Connection lifecycle management.
//!
//! This module defines the trait the pool uses to check and reset
//! connections, and the bookkeeping it keeps per pooled connection.

use std::time::{Duration, Instant};

use mysql_client::Connection;

use crate::error::PoolError;

/// Trait for connection lifecycle management.
///
/// This trait defines the operations needed to manage connection health
/// and state within the pool.
#[allow(async_fn_in_trait)]
pub trait ConnectionLifecycle: Send + Sync {
    /// Check if the connection is healthy.
    async fn health_check(&self) -> Result<(), PoolError>;

    /// Reset connection state for pool return.
    ///
    /// Rolls back open transactions, drops temporary tables and user
    /// variables, and releases prepared statements.
    async fn reset(&mut self) -> Result<(), PoolError>;

    /// Check if the connection is still valid for use.
    ///
    /// This is a lighter-weight check than `health_check`: it does not
    /// touch the network.
    fn is_valid(&self) -> bool;
}

impl ConnectionLifecycle for Connection {
    async fn health_check(&self) -> Result<(), PoolError> {
        self.ping()
            .await
            .map_err(|e| PoolError::UnhealthyConnection(e.to_string()))
    }

    async fn reset(&mut self) -> Result<(), PoolError> {
        self.reset_connection()
            .await
            .map_err(|e| PoolError::ResetFailed(e.to_string()))
    }

    fn is_valid(&self) -> bool {
        !self.is_closed()
    }
}

/// Bookkeeping about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique identifier for this connection within the pool.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
}

impl ConnectionInfo {
    /// Create bookkeeping for a new connection.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
        }
    }

    /// Check if the connection has exceeded its maximum lifetime.
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|max| self.created_at.elapsed() > max)
    }

    /// Check if the connection has been idle too long.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used_at.elapsed() > timeout)
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }
}
