//! # mysql-testing
//!
//! Test infrastructure for MySQL driver development.
//!
//! This crate provides a scripted MySQL server that speaks the real wire
//! protocol, so client behavior can be tested without a database.
//!
//! ## Features
//!
//! - Handshake with native, caching_sha2 (fast and full) and clear-text
//!   authentication, including auth switches
//! - TLS upgrade with a generated certificate and the compressed protocol
//! - Text and binary result sets, multi-results, errors after rows and
//!   `LOAD DATA LOCAL INFILE`
//! - Recording of queries, executions and handshakes for assertions
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use mysql_testing::{MockMySqlServer, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockMySqlServer::builder()
//!         .with_user("app", "secret")
//!         .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.host() / server.port()
//!     let port = server.port();
//!     // ...
//!     assert_eq!(server.queries().await, vec!["SELECT 1 AS a"]);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    AuthMode, MockMySqlServer, MockResponse, MockServerBuilder, MockServerConfig, MockServerError,
    RecordedExecution, RecordedHandshake,
};
