//! Mock MySQL server fidelity tests.
//!
//! These tests drive the mock server with a bare protocol client built from
//! `mysql-protocol` and `mysql-codec`, so they check the bytes on the wire
//! rather than the behavior of the driver.
//!
//! ```bash
//! cargo test -p mysql-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mysql_auth::plugin::scramble_native;
use mysql_codec::PacketStream;
use mysql_protocol::codec::read_lenenc_int;
use mysql_protocol::command::encode_query;
use mysql_protocol::packet::{EOF_HEADER, ERR_HEADER, OK_HEADER};
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, ColumnType, ErrPacket, HandshakeResponse, HandshakeV10,
    OkPacket, StatusFlags, charset,
};
use mysql_testing::{AuthMode, MockMySqlServer, MockResponse};
use mysql_types::SqlValue;
use tokio::net::TcpStream;

type Client = PacketStream<TcpStream>;

async fn recv(client: &mut Client) -> Bytes {
    client
        .next()
        .await
        .expect("server closed the connection")
        .expect("codec error")
        .payload
}

/// Connect and log in with `mysql_native_password`.
async fn login(server: &MockMySqlServer, user: &str, password: &str, caps: CapabilityFlags) -> (Client, Bytes) {
    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut client = PacketStream::new(stream);

    let mut payload = recv(&mut client).await;
    let handshake = HandshakeV10::decode(&mut payload).unwrap();

    let mut buf = BytesMut::new();
    HandshakeResponse {
        capabilities: caps,
        max_packet_size: 16 * 1024 * 1024,
        charset: charset::UTF8MB4_GENERAL_CI,
        username: user.into(),
        auth_response: Bytes::from(scramble_native(password, &handshake.auth_seed)),
        auth_plugin: Some("mysql_native_password".into()),
        ..HandshakeResponse::default()
    }
    .encode(&mut buf);
    client.send(buf.freeze()).await.unwrap();

    let reply = recv(&mut client).await;
    (client, reply)
}

async fn query(client: &mut Client, sql: &str) {
    client.codec_mut().reset_sequence();
    client.send(encode_query(sql)).await.unwrap();
}

fn eof_caps() -> CapabilityFlags {
    CapabilityFlags::client_default() - CapabilityFlags::DEPRECATE_EOF
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn test_mock_server_starts_and_listens() {
    let server = MockMySqlServer::builder().build().await.unwrap();

    assert!(server.port() > 0);
    assert_eq!(server.host(), "127.0.0.1");
    assert_eq!(server.connection_count(), 0);
    assert!(server.certificate_pem().is_none());

    server.stop();
}

#[tokio::test]
async fn test_initial_handshake() {
    let server = MockMySqlServer::builder()
        .with_server_version("8.4.0-fidelity")
        .with_auth(AuthMode::CachingSha2Fast)
        .with_tls()
        .build()
        .await
        .unwrap();

    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut client = PacketStream::new(stream);
    let mut payload = recv(&mut client).await;
    let handshake = HandshakeV10::decode(&mut payload).unwrap();

    assert_eq!(handshake.server_version, "8.4.0-fidelity");
    assert_eq!(handshake.auth_seed.len(), 20);
    assert!(handshake.auth_seed.iter().all(|&b| b != 0));
    assert_eq!(handshake.auth_plugin.as_deref(), Some("caching_sha2_password"));
    assert!(handshake.capabilities.contains(CapabilityFlags::PROTOCOL_41));
    assert!(handshake.capabilities.contains(CapabilityFlags::SSL));
    assert!(!handshake.capabilities.contains(CapabilityFlags::COMPRESS));
    assert!(server.certificate_pem().unwrap().contains("BEGIN CERTIFICATE"));
}

#[tokio::test]
async fn test_native_login_records_handshake() {
    let server = MockMySqlServer::builder()
        .with_user("app", "secret")
        .build()
        .await
        .unwrap();

    let (_client, reply) = login(&server, "app", "secret", CapabilityFlags::client_default()).await;
    assert_eq!(reply[0], OK_HEADER);

    let handshakes = server.handshakes().await;
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0].username, "app");
    assert!(!handshakes[0].tls);
    assert_eq!(
        handshakes[0].auth_plugin.as_deref(),
        Some("mysql_native_password")
    );
}

#[tokio::test]
async fn test_wrong_password_is_access_denied() {
    let server = MockMySqlServer::builder()
        .with_user("app", "secret")
        .build()
        .await
        .unwrap();

    let (_client, mut reply) = login(&server, "app", "wrong", CapabilityFlags::client_default()).await;
    assert_eq!(reply[0], ERR_HEADER);
    let err = ErrPacket::decode(&mut reply).unwrap();
    assert_eq!(err.code, 1045);
    assert_eq!(err.sql_state, "28000");
}

// =============================================================================
// Command phase
// =============================================================================

#[tokio::test]
async fn test_text_result_with_eof_packets() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let (mut client, _) = login(&server, "root", "", eof_caps()).await;

    query(&mut client, "SELECT 1 AS a").await;

    let mut count = recv(&mut client).await;
    assert_eq!(read_lenenc_int(&mut count).unwrap(), 1);
    let mut column = recv(&mut client).await;
    let column = ColumnDefinition::decode(&mut column).unwrap();
    assert_eq!(column.name, "a");
    assert_eq!(column.column_type, ColumnType::LongLong);

    let eof = recv(&mut client).await;
    assert_eq!(eof[0], EOF_HEADER);
    let row = recv(&mut client).await;
    assert_eq!(&row[..], b"\x011");
    let eof = recv(&mut client).await;
    assert_eq!(eof[0], EOF_HEADER);
    assert!(eof.len() < 9);

    assert_eq!(server.queries().await, vec!["SELECT 1 AS a".to_string()]);
}

#[tokio::test]
async fn test_multi_result_sets_more_results_flag() {
    let server = MockMySqlServer::builder()
        .with_response(
            "CALL p()",
            MockResponse::Multi(vec![MockResponse::scalar("x", 1i64), MockResponse::ok()]),
        )
        .build()
        .await
        .unwrap();
    let caps = CapabilityFlags::client_default();
    let (mut client, _) = login(&server, "root", "", caps).await;

    query(&mut client, "CALL p()").await;
    let _count = recv(&mut client).await;
    let _column = recv(&mut client).await;
    let _row = recv(&mut client).await;

    let mut terminator = recv(&mut client).await;
    assert_eq!(terminator[0], EOF_HEADER);
    let ok = OkPacket::decode(&mut terminator, caps).unwrap();
    assert!(ok.status.contains(StatusFlags::MORE_RESULTS_EXISTS));

    let mut last = recv(&mut client).await;
    let ok = OkPacket::decode(&mut last, caps).unwrap();
    assert!(!ok.status.contains(StatusFlags::MORE_RESULTS_EXISTS));
}

#[tokio::test]
async fn test_error_after_rows() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::RowsThenError {
            columns: vec![ColumnDefinition::new("n", ColumnType::LongLong)],
            rows: vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
            code: 1317,
            message: "Query execution was interrupted".into(),
        })
        .build()
        .await
        .unwrap();
    let (mut client, _) = login(&server, "root", "", CapabilityFlags::client_default()).await;

    query(&mut client, "SELECT n FROM t").await;
    let _count = recv(&mut client).await;
    let _column = recv(&mut client).await;
    assert_eq!(&recv(&mut client).await[..], b"\x011");
    assert_eq!(&recv(&mut client).await[..], b"\x012");
    let mut err = recv(&mut client).await;
    let err = ErrPacket::decode(&mut err).unwrap();
    assert_eq!(err.code, 1317);

    // The connection stays usable.
    query(&mut client, "SELECT n FROM t").await;
    let mut count = recv(&mut client).await;
    assert_eq!(read_lenenc_int(&mut count).unwrap(), 1);
}

#[tokio::test]
async fn test_custom_response_sees_sql() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::custom(|sql| {
            MockResponse::affected(sql.len() as u64)
        }))
        .build()
        .await
        .unwrap();
    let caps = CapabilityFlags::client_default();
    let (mut client, _) = login(&server, "root", "", caps).await;

    query(&mut client, "DELETE FROM t").await;
    let mut ok = recv(&mut client).await;
    let ok = OkPacket::decode(&mut ok, caps).unwrap();
    assert_eq!(ok.affected_rows, 13);
}

#[tokio::test]
async fn test_unknown_command_is_rejected() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let (mut client, _) = login(&server, "root", "", CapabilityFlags::client_default()).await;

    client.codec_mut().reset_sequence();
    client.send(Bytes::from_static(&[0x7F])).await.unwrap();
    let mut err = recv(&mut client).await;
    assert_eq!(err.chunk()[0], ERR_HEADER);
    assert_eq!(ErrPacket::decode(&mut err).unwrap().code, 1047);
    assert_eq!(server.commands().await, vec![0x7F]);
}

#[tokio::test]
async fn test_disconnect_response_closes_socket() {
    let server = MockMySqlServer::builder()
        .with_response("KILL", MockResponse::Disconnect)
        .build()
        .await
        .unwrap();
    let (mut client, _) = login(&server, "root", "", CapabilityFlags::client_default()).await;

    query(&mut client, "KILL").await;
    assert!(client.next().await.is_none());
}
