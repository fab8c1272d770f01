//! # mysql-client
//!
//! Async MySQL client built on a per-connection protocol driver.
//!
//! This is the primary public API surface of the workspace. Every
//! [`Connection`] owns a background task that holds the socket, frames
//! packets and decodes responses; the handle you call methods on only
//! submits commands and awaits their answers.
//!
//! ## Features
//!
//! - **Pipelined handles**: `Connection` is `Clone`; commands from every
//!   clone run in submission order on one socket
//! - **Streaming results**: columns arrive first, rows stream through
//!   [`ResultSet::next_row`] or the `Stream` impl
//! - **Multi-result queries**: `SELECT 1; SELECT 2` and stored procedure
//!   calls chain through [`ResultSet::next_result`]
//! - **Prepared statements**: `?` and `:name` placeholders, long data,
//!   and an LRU statement cache
//! - **Transactions**: isolation levels and savepoints
//! - **TLS and compression**: rustls upgrade and the zlib envelope
//!
//! ## Connection lifecycle
//!
//! ```text
//! Unconnected -> Connecting -> Established -> Ready -> Closing -> Closed
//! ```
//!
//! A protocol violation or socket error moves straight to `Closed` and
//! fails every queued command. A server error fails only its own command.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_client::{Config, Connection, IsolationLevel, Params};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mysql_client::Error> {
//!     let config = Config::new()
//!         .host("localhost")
//!         .user("app")
//!         .password("secret")
//!         .database("shop");
//!     let conn = Connection::connect(config).await?;
//!
//!     let stmt = conn.prepare("SELECT name FROM users WHERE id = ?").await?;
//!     let mut result = stmt.execute(Params::new().push(1)).await?;
//!     while let Some(row) = result.next_row().await? {
//!         let name: String = row.get("name")?;
//!         println!("User: {name}");
//!     }
//!
//!     let mut tx = conn.begin(IsolationLevel::ReadCommitted).await?;
//!     tx.query("UPDATE users SET active = 1").await?;
//!     let sp = tx.savepoint("before_delete").await?;
//!     tx.query("DELETE FROM users WHERE active = 0").await?;
//!     tx.rollback_to(&sp).await?;
//!     tx.commit().await?;
//!
//!     conn.close().await
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
mod connect;
pub mod connection;
pub mod error;
pub mod metadata;
pub mod params;
mod processor;
pub mod result;
pub mod row;
pub mod state;
pub mod statement;
pub mod statement_cache;
pub mod transaction;
mod transport;

// Re-export commonly used types
pub use config::{Config, DEFAULT_PORT, TimeoutConfig};
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use metadata::{ConnectionMetadata, ServerError, SessionState};
pub use mysql_auth::{Credentials, RsaKeyCache};
pub use mysql_protocol::{ColumnType, StatusFlags};
#[cfg(feature = "tls")]
pub use mysql_tls::{SslMode, TlsConfig};
pub use mysql_types::{FromSql, SqlValue, ToSql, TypeError};
pub use params::{Params, ParsedSql, Slot};
pub use result::{Completion, ResultSet};
pub use row::{Column, ColumnIndex, Row};
pub use state::{ConnectionState, ParseMode};
pub use statement::Statement;
pub use statement_cache::StatementCache;
pub use transaction::{IsolationLevel, NestedTransaction, SavePoint, Transaction};
pub use transport::{BoxedTransport, Transport};
