//! Integration tests for mysql-client against the mock MySQL server.
//!
//! Every test starts its own `MockMySqlServer`, so these run without a
//! database:
//!
//! ```bash
//! cargo test -p mysql-client --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use futures_util::StreamExt;
use mysql_client::{
    ColumnType, Config, Connection, ConnectionState, Error, ErrorKind, IsolationLevel, Params,
    SqlValue,
};
use mysql_protocol::ColumnDefinition;
use mysql_testing::{MockMySqlServer, MockResponse};

fn config(server: &MockMySqlServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .user("root")
        .connect_timeout(Duration::from_secs(5))
}

fn users() -> MockResponse {
    MockResponse::rows(
        vec![
            ColumnDefinition::new("id", ColumnType::LongLong).with_table("users"),
            ColumnDefinition::new("name", ColumnType::VarString).with_table("users"),
        ],
        vec![
            vec![SqlValue::Int(1), SqlValue::String("alice".into())],
            vec![SqlValue::Int(2), SqlValue::Null],
        ],
    )
}

// =============================================================================
// Connecting
// =============================================================================

#[tokio::test]
async fn test_connect_and_metadata() {
    let server = MockMySqlServer::builder()
        .with_server_version("8.0.36-it")
        .build()
        .await
        .unwrap();

    let conn = Connection::connect(config(&server).database("shop"))
        .await
        .unwrap();

    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(conn.is_idle());
    let meta = conn.metadata();
    assert_eq!(meta.server_version, "8.0.36-it");
    assert!(meta.connection_id > 0);

    let handshakes = server.handshakes().await;
    assert_eq!(handshakes[0].database.as_deref(), Some("shop"));
    assert!(
        handshakes[0]
            .attributes
            .iter()
            .any(|(k, _)| k == "_client_name")
    );
    // The database went in the handshake, not through COM_INIT_DB.
    assert!(server.databases().await.is_empty());

    conn.close().await.unwrap();
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_sql_mode_applied_after_connect() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let _conn = Connection::connect(config(&server).sql_mode("STRICT_ALL_TABLES"))
        .await
        .unwrap();

    assert_eq!(
        server.queries().await,
        vec!["SET SESSION sql_mode = 'STRICT_ALL_TABLES'".to_string()]
    );
}

#[tokio::test]
async fn test_wrong_password_fails_handshake() {
    let server = MockMySqlServer::builder()
        .with_user("app", "secret")
        .build()
        .await
        .unwrap();

    let err = Connection::connect(config(&server).user("app").password("nope"))
        .await
        .unwrap_err();
    match err {
        Error::Handshake { code, .. } => assert_eq!(code, 1045),
        other => panic!("expected handshake error, got {other:?}"),
    }
}

// =============================================================================
// Text queries
// =============================================================================

#[tokio::test]
async fn test_select_one() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut result = conn.query("SELECT 1 AS a").await.unwrap();
    // Columns are known before any row is read.
    assert_eq!(result.columns().len(), 1);
    assert_eq!(result.columns()[0].name(), "a");
    assert!(result.has_rows());

    let row = result.next_row().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("a").unwrap(), 1);
    assert_eq!(row.get::<i64>(0).unwrap(), 1);
    assert!(result.next_row().await.unwrap().is_none());
    assert!(result.is_complete());
    assert!(result.next_result().await.unwrap().is_none());
}

#[tokio::test]
async fn test_row_conversion_error_keeps_connection() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let rows = conn.query("SELECT 1 AS a").await.unwrap().collect_rows().await.unwrap();
    let err: Error = rows[0].get::<i64>("no_such_column").unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(!err.is_fatal());

    let mut result = conn.query("SELECT 1 AS a").await.unwrap();
    assert!(result.next_row().await.unwrap().is_some());
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_undecodable_row_is_fatal() {
    let server = MockMySqlServer::builder()
        .with_response(
            "SELECT broken",
            MockResponse::rows(
                vec![ColumnDefinition::new("n", ColumnType::LongLong)],
                vec![vec![SqlValue::String("not a number".into())]],
            ),
        )
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut result = conn.query("SELECT broken").await.unwrap();
    let err = result.next_row().await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_rows_with_null_and_stream() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT id, name FROM users", users())
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let result = conn.query("SELECT id, name FROM users").await.unwrap();
    assert_eq!(result.columns()[1].table(), "users");
    let rows: Vec<_> = result.collect::<Vec<_>>().await;
    assert_eq!(rows.len(), 2);

    let first = rows[0].as_ref().unwrap();
    assert_eq!(first.get::<String>("name").unwrap(), "alice");
    let second = rows[1].as_ref().unwrap();
    assert!(second.is_null("name"));
    assert_eq!(second.try_get::<String>("name"), None);
}

#[tokio::test]
async fn test_ok_packet_fields() {
    let server = MockMySqlServer::builder()
        .with_response("INSERT INTO t VALUES (1)", MockResponse::inserted(42))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let result = conn.query("INSERT INTO t VALUES (1)").await.unwrap();
    assert!(!result.has_rows());
    assert!(result.is_complete());
    assert_eq!(result.affected_rows(), 1);
    assert_eq!(result.last_insert_id(), 42);
    assert_eq!(conn.metadata().last_insert_id, 42);
}

#[tokio::test]
async fn test_multi_result_query() {
    let server = MockMySqlServer::builder()
        .with_response(
            "SELECT 1; SELECT 2",
            MockResponse::Multi(vec![
                MockResponse::scalar("1", 1i64),
                MockResponse::scalar("2", 2i64),
            ]),
        )
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut first = conn.query("SELECT 1; SELECT 2").await.unwrap();
    // Rows of the first result are still unread.
    assert!(matches!(
        first.next_result().await,
        Err(Error::ResultNotConsumed)
    ));

    let rows = first.collect_rows().await.unwrap();
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
    assert!(first.has_more_results());

    let mut second = first.next_result().await.unwrap().unwrap();
    let rows = second.collect_rows().await.unwrap();
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 2);
    assert!(second.next_result().await.unwrap().is_none());
}

#[tokio::test]
async fn test_error_mid_result_keeps_connection() {
    let server = MockMySqlServer::builder()
        .with_response(
            "SELECT n FROM big",
            MockResponse::RowsThenError {
                columns: vec![ColumnDefinition::new("n", ColumnType::LongLong)],
                rows: vec![vec![SqlValue::Int(1)]],
                code: 1317,
                message: "Query execution was interrupted".into(),
            },
        )
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut result = conn.query("SELECT n FROM big").await.unwrap();
    assert!(result.next_row().await.unwrap().is_some());
    match result.next_row().await {
        Err(Error::Server { code, sql, .. }) => {
            assert_eq!(code, 1317);
            assert_eq!(sql.as_deref(), Some("SELECT n FROM big"));
        }
        other => panic!("expected server error, got {other:?}"),
    }

    let mut result = conn.query("SELECT 1 AS a").await.unwrap();
    assert_eq!(result.collect_rows().await.unwrap().len(), 1);
    assert_eq!(conn.metadata().last_error.unwrap().code, 1317);
}

#[tokio::test]
async fn test_server_error_is_not_fatal() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::error_with_state(
            1146,
            "42S02",
            "Table 'shop.nope' doesn't exist",
        ))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let err = conn.query("SELECT * FROM nope").await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(matches!(err, Error::Server { code: 1146, .. }));
    conn.ping().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_fails_pending_commands() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT SLEEP(10)", MockResponse::Disconnect)
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let err = conn.query("SELECT SLEEP(10)").await.unwrap_err();
    assert!(err.is_fatal() || matches!(err, Error::ConnectionClosed));
    assert!(conn.ping().await.is_err());
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_clones_pipeline_in_order() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::custom(|sql| {
            MockResponse::scalar("q", SqlValue::String(sql.to_string()))
        }))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();
    let other = conn.clone();

    let (a, b) = tokio::join!(
        async {
            let mut r = conn.query("SELECT 'a'").await.unwrap();
            r.collect_rows().await.unwrap()
        },
        async {
            let mut r = other.query("SELECT 'b'").await.unwrap();
            r.collect_rows().await.unwrap()
        }
    );
    assert_eq!(a[0].get::<String>(0).unwrap(), "SELECT 'a'");
    assert_eq!(b[0].get::<String>(0).unwrap(), "SELECT 'b'");
    assert_eq!(server.queries().await.len(), 2);
}

#[tokio::test]
async fn test_dropped_result_is_drained() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT id, name FROM users", users())
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    drop(conn.query("SELECT id, name FROM users").await.unwrap());
    let mut result = conn.query("SELECT 1 AS a").await.unwrap();
    let row = result.next_row().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("a").unwrap(), 1);
}

// =============================================================================
// Prepared statements
// =============================================================================

#[tokio::test]
async fn test_prepared_statement_with_placeholders() {
    let sql = "SELECT id, name FROM users WHERE id = ? AND name = ?";
    let server = MockMySqlServer::builder()
        .with_response(sql, users())
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare(sql).await.unwrap();
    assert_eq!(stmt.param_count(), 2);
    assert_eq!(stmt.columns().len(), 2);

    let mut result = stmt.execute(Params::new().push(5).push("x")).await.unwrap();
    let rows = result.collect_rows().await.unwrap();
    assert_eq!(rows[0].get::<i64>("id").unwrap(), 1);
    assert_eq!(rows[0].get::<String>("name").unwrap(), "alice");
    assert!(rows[1].is_null("name"));

    let executions = server.executions().await;
    assert_eq!(executions.len(), 1);
    assert_eq!(
        executions[0].params,
        vec![SqlValue::Int(5), SqlValue::String("x".into())]
    );
}

#[tokio::test]
async fn test_named_placeholders_are_rewritten() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn
        .prepare("UPDATE t SET a = :a WHERE id = :id OR parent = :id")
        .await
        .unwrap();
    assert_eq!(stmt.param_count(), 3);

    let params: Params = [("a", SqlValue::Int(7)), ("id", SqlValue::Int(3))]
        .into_iter()
        .collect();
    stmt.execute(params).await.unwrap();

    assert_eq!(
        server.prepares().await,
        vec!["UPDATE t SET a = ? WHERE id = ? OR parent = ?".to_string()]
    );
    assert_eq!(
        server.executions().await[0].params,
        vec![SqlValue::Int(7), SqlValue::Int(3), SqlValue::Int(3)]
    );
}

#[tokio::test]
async fn test_missing_parameter_is_usage_error() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare("SELECT ? + ?").await.unwrap();
    let err = stmt.execute(Params::new().push(1)).await.unwrap_err();
    assert!(matches!(err, Error::MissingParameter(_)));
    assert!(server.executions().await.is_empty());
}

#[tokio::test]
async fn test_long_data_parameter() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare("INSERT INTO files VALUES (?, ?)").await.unwrap();
    stmt.bind(1, &b"first chunk "[..]).unwrap();
    stmt.bind(1, &b"second chunk"[..]).unwrap();
    stmt.execute(Params::new().push(9)).await.unwrap();

    let executions = server.executions().await;
    assert_eq!(executions[0].params[0], SqlValue::Int(9));
    assert_eq!(
        executions[0].params[1],
        SqlValue::Binary(bytes::Bytes::from_static(b"first chunk second chunk"))
    );
    assert!(matches!(stmt.bind(2, vec![0u8]), Err(Error::UnknownParameter(_))));
}

#[tokio::test]
async fn test_statement_close_is_idempotent() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare("DELETE FROM t WHERE id = ?").await.unwrap();
    let id = stmt.id();
    stmt.close().unwrap();
    stmt.close().unwrap();
    assert!(stmt.is_closed());
    assert!(matches!(
        stmt.execute(Params::new().push(1)).await,
        Err(Error::StatementClosed)
    ));

    conn.ping().await.unwrap();
    assert_eq!(server.closed_statements().await, vec![id]);
}

#[tokio::test]
async fn test_prepare_cached_evicts_least_recent() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server).statement_cache_size(1))
        .await
        .unwrap();

    let first = conn.prepare_cached("SELECT 1").await.unwrap();
    let again = conn.prepare_cached("SELECT 1").await.unwrap();
    assert_eq!(first.id(), again.id());
    assert_eq!(server.prepares().await.len(), 1);

    let _second = conn.prepare_cached("SELECT 2").await.unwrap();
    assert_eq!(conn.cached_statements(), 1);
    assert!(first.is_closed());

    conn.ping().await.unwrap();
    assert_eq!(server.closed_statements().await, vec![first.id()]);
}

#[tokio::test]
async fn test_reset_connection_invalidates_cache() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare_cached("SELECT ?").await.unwrap();
    conn.reset_connection().await.unwrap();

    assert_eq!(conn.cached_statements(), 0);
    assert!(stmt.is_closed());
    let fresh = conn.prepare_cached("SELECT ?").await.unwrap();
    assert!(!fresh.is_closed());
    assert_eq!(server.prepares().await.len(), 2);
}

#[tokio::test]
async fn test_execute_by_id() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let stmt = conn.prepare("UPDATE t SET a = ?").await.unwrap();
    conn.execute(stmt.id(), &[SqlValue::Double(1.5)])
        .await
        .unwrap();
    assert_eq!(server.executions().await[0].params, vec![SqlValue::Double(1.5)]);

    let err = conn.execute(999, &[]).await.unwrap_err();
    assert!(matches!(err, Error::Server { code: 1243, .. }));
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_statement_sequence() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut tx = conn.begin(IsolationLevel::ReadCommitted).await.unwrap();
    tx.query("UPDATE accounts SET balance = 0").await.unwrap();
    let sp = tx.savepoint("before_delete").await.unwrap();
    tx.query_drop("DELETE FROM audit").await.unwrap();
    tx.rollback_to(&sp).await.unwrap();
    tx.release(sp).await.unwrap();
    tx.commit().await.unwrap();
    assert!(tx.is_finished());
    assert!(matches!(tx.commit().await, Err(Error::TransactionFinished)));

    assert_eq!(
        server.queries().await,
        vec![
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            "START TRANSACTION",
            "UPDATE accounts SET balance = 0",
            "SAVEPOINT before_delete",
            "DELETE FROM audit",
            "ROLLBACK TO SAVEPOINT before_delete",
            "RELEASE SAVEPOINT before_delete",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn test_nested_transaction_levels() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut tx = conn.begin(IsolationLevel::default()).await.unwrap();
    {
        let mut outer = tx.nested().await.unwrap();
        assert_eq!(outer.savepoint().name(), "sp_1");
        outer.query_drop("INSERT INTO orders VALUES (1)").await.unwrap();

        let inner = outer.nested().await.unwrap();
        assert_eq!(inner.savepoint().name(), "sp_2");
        inner.query_drop("INSERT INTO items VALUES (1)").await.unwrap();
        inner.rollback().await.unwrap();

        let inner = outer.nested().await.unwrap();
        assert_eq!(inner.savepoint().name(), "sp_2");
        drop(inner);

        outer.commit().await.unwrap();
    }
    assert_eq!(tx.depth(), 0);
    tx.commit().await.unwrap();

    let queries = server.queries().await;
    assert_eq!(
        queries[2..],
        [
            "SAVEPOINT sp_1",
            "INSERT INTO orders VALUES (1)",
            "SAVEPOINT sp_2",
            "INSERT INTO items VALUES (1)",
            "ROLLBACK TO SAVEPOINT sp_2",
            "SAVEPOINT sp_2",
            "ROLLBACK TO SAVEPOINT sp_2",
            "RELEASE SAVEPOINT sp_1",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn test_transaction_holds_connection() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();
    let other = conn.clone();

    let mut tx = conn.begin(IsolationLevel::default()).await.unwrap();
    assert!(other.in_transaction());
    assert!(matches!(other.query("SELECT 1").await, Err(Error::TransactionActive)));
    assert!(matches!(other.prepare("SELECT ?").await, Err(Error::TransactionActive)));
    assert!(matches!(
        other.begin(IsolationLevel::default()).await,
        Err(Error::TransactionActive)
    ));
    let err = other.query_drop("SELECT 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    other.ping().await.unwrap();

    tx.query_drop("UPDATE t SET a = 1").await.unwrap();
    tx.commit().await.unwrap();
    assert!(!other.in_transaction());
    other.query_drop("SELECT 1").await.unwrap();

    {
        let _tx = other.begin(IsolationLevel::default()).await.unwrap();
        assert!(conn.in_transaction());
    }
    assert!(!conn.in_transaction());
    conn.query_drop("SELECT 1").await.unwrap();

    let queries = server.queries().await;
    assert!(!queries.contains(&"SELECT ?".to_owned()));
    assert_eq!(queries.iter().filter(|q| *q == "START TRANSACTION").count(), 2);
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    {
        let tx = conn.begin(IsolationLevel::default()).await.unwrap();
        tx.query("DELETE FROM t").await.unwrap();
    }
    conn.ping().await.unwrap();

    let queries = server.queries().await;
    assert_eq!(queries.last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn test_invalid_savepoint_name() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let mut tx = conn.begin(IsolationLevel::Serializable).await.unwrap();
    let err = tx.savepoint("x; DROP TABLE t").await.unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier(_)));
    tx.rollback().await.unwrap();
}

// =============================================================================
// Other commands
// =============================================================================

#[tokio::test]
async fn test_use_database() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    conn.use_database("inventory").await.unwrap();
    assert_eq!(server.databases().await, vec!["inventory".to_string()]);
    assert_eq!(
        conn.metadata().session.schema.as_deref(),
        Some("inventory")
    );
    assert!(matches!(
        conn.use_database("").await,
        Err(Error::InvalidIdentifier(_))
    ));
}

#[tokio::test]
async fn test_list_fields() {
    let server = MockMySqlServer::builder()
        .with_fields(
            "users",
            vec![
                ColumnDefinition::new("id", ColumnType::Long).with_table("users"),
                ColumnDefinition::new("email", ColumnType::VarString).with_table("users"),
            ],
        )
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let fields = conn.list_fields("users", "").await.unwrap();
    let names: Vec<_> = fields.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["id", "email"]);
    assert_eq!(fields[0].column_type(), ColumnType::Long);

    let err = conn.list_fields("missing", "").await.unwrap_err();
    assert!(matches!(err, Error::Server { code: 1146, .. }));
    conn.ping().await.unwrap();
}

#[tokio::test]
async fn test_local_infile() {
    let path = std::env::temp_dir().join(format!("mysql-client-infile-{}.csv", std::process::id()));
    std::fs::write(&path, "1,alice\n2,bob\n").unwrap();
    let path_str = path.to_string_lossy().into_owned();

    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::LocalInfile(path_str.clone()))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server).local_infile(true))
        .await
        .unwrap();

    let result = conn
        .query(&format!("LOAD DATA LOCAL INFILE '{path_str}' INTO TABLE users"))
        .await
        .unwrap();
    assert_eq!(result.affected_rows(), 2);
    assert_eq!(
        server.local_infile_data().await,
        vec![bytes::Bytes::from_static(b"1,alice\n2,bob\n")]
    );

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn test_local_infile_refused_by_default() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::LocalInfile("/etc/passwd".into()))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config(&server)).await.unwrap();

    let err = conn
        .query("LOAD DATA LOCAL INFILE '/etc/passwd' INTO TABLE t")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LocalInfileDisabled(_)));
    assert!(server.local_infile_data().await.is_empty());
}
