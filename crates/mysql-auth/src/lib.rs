//! # mysql-auth
//!
//! Authentication plugins for MySQL connections.
//!
//! This crate computes auth responses and drives the plugin negotiation,
//! isolated from connection logic for better modularity and testing.
//!
//! ## Supported Plugins
//!
//! | Plugin | Description |
//! |--------|-------------|
//! | `mysql_native_password` | SHA-1 challenge-response |
//! | `caching_sha2_password` | SHA-256 challenge-response, full auth via TLS or RSA |
//! | `sha256_password` | Password over TLS or RSA-encrypted |
//! | `mysql_clear_password` | Clear-text password, for TLS or Unix sockets |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod exchange;
pub mod plugin;
pub mod public_key;

pub use credentials::Credentials;
pub use error::AuthError;
pub use exchange::{AuthExchange, AuthOptions, AuthStep};
pub use plugin::AuthPlugin;
pub use public_key::RsaKeyCache;
