//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The server asked for a plugin this client does not implement.
    #[error("unsupported authentication plugin: {0}")]
    UnsupportedPlugin(String),

    /// The server sent auth data the current plugin does not expect.
    #[error("unexpected {plugin} auth data: {reason}")]
    UnexpectedData {
        /// Plugin in use.
        plugin: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The server public key could not be parsed.
    #[error("invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    /// RSA encryption of the password failed.
    #[error("RSA encryption failed: {0}")]
    Rsa(String),

    /// The auth seed is missing or empty.
    #[error("authentication seed is empty")]
    EmptySeed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}
