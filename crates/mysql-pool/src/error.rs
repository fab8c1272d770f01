//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Failed to acquire a connection within the timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquisitionTimeout(std::time::Duration),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Opening a connection or running a command failed.
    #[error(transparent)]
    Connection(#[from] mysql_client::Error),

    /// Connection is unhealthy.
    #[error("connection health check failed: {0}")]
    UnhealthyConnection(String),

    /// Connection reset failed.
    #[error("connection reset failed: {0}")]
    ResetFailed(String),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// The client error behind this error, if any.
    #[must_use]
    pub fn as_client_error(&self) -> Option<&mysql_client::Error> {
        match self {
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }

    /// Check if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AcquisitionTimeout(_) | Self::UnhealthyConnection(_) | Self::ResetFailed(_) => {
                true
            }
            Self::Connection(err) => err.is_transient(),
            Self::PoolClosed | Self::Configuration(_) => false,
        }
    }
}
