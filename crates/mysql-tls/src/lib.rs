//! # mysql-tls
//!
//! TLS upgrade layer for MySQL connections.
//!
//! MySQL negotiates TLS inside the protocol rather than before it:
//!
//! ```text
//! TCP Connect → Handshake v10 (cleartext) → SSLRequest → TLS Handshake
//!             → HandshakeResponse (encrypted) → auth exchange (encrypted)
//! ```
//!
//! The server advertises support with the `CLIENT_SSL` capability. The
//! SSLRequest is the first 32 bytes of the handshake response, and the full
//! response follows inside the TLS stream with the next sequence id.
//!
//! ## Features
//!
//! - TLS 1.2 and TLS 1.3 support via rustls
//! - MySQL SSL modes: `Preferred`, `Required`, `VerifyCa`, `VerifyIdentity`
//! - Custom certificate authority support
//! - Client certificate authentication
//!
//! ## Security
//!
//! By default, this crate validates server certificates and hostnames using
//! the Mozilla root certificate store. `Preferred` and `Required` skip
//! validation and log a warning.
//!
//! ```rust,ignore
//! use mysql_tls::{SslMode, TlsConfig, TlsConnector};
//!
//! let connector = TlsConnector::new(
//!     TlsConfig::new()
//!         .mode(SslMode::VerifyCa)
//!         .add_root_certificates_pem(ca_pem)?,
//! )?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;

pub use config::{ClientAuth, SslMode, TlsConfig, TlsVersion};
pub use connector::TlsConnector;
pub use error::TlsError;

// Re-export tokio-rustls stream type for convenience
pub use tokio_rustls::client::TlsStream;
