//! Connection pool integration tests.
//!
//! Every test runs against its own `MockMySqlServer`:
//!
//! ```bash
//! cargo test -p mysql-driver-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use mysql_client::{ColumnType, Config, IsolationLevel, SqlValue};
use mysql_driver_pool::{Pool, PoolBuilder, PoolError};
use mysql_protocol::{ColumnDefinition, Command};
use mysql_testing::{MockMySqlServer, MockResponse};

fn client(server: &MockMySqlServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .user("root")
}

fn builder(server: &MockMySqlServer) -> PoolBuilder {
    Pool::builder()
        .client(client(server))
        .connection_timeout(Duration::from_secs(5))
}

fn big_table() -> MockResponse {
    let rows = (0..2000).map(|i| vec![SqlValue::Int(i)]).collect();
    MockResponse::rows(vec![ColumnDefinition::new("id", ColumnType::LongLong)], rows)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn count_commands(server: &MockMySqlServer, command: Command) -> usize {
    server
        .commands()
        .await
        .into_iter()
        .filter(|&c| c == command as u8)
        .count()
}

// =============================================================================
// Acquire and return
// =============================================================================

#[tokio::test]
async fn test_pool_create_and_close() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .min_connections(2)
        .max_connections(5)
        .build()
        .await
        .unwrap();

    let status = pool.status();
    assert_eq!(status.max, 5);
    assert_eq!(status.total, 2);
    assert_eq!(status.available, 2);
    assert_eq!(status.in_use, 0);

    pool.close().await;
    assert!(pool.is_closed());
    assert_eq!(pool.status().total, 0);
    wait_for(|| server.connection_count() == 0).await;
}

#[tokio::test]
async fn test_connection_is_reused() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).reset_on_return(false).build().await.unwrap();

    let conn = pool.acquire().await.unwrap();
    let id = conn.id();
    assert_eq!(conn.checkout_count(), 1);
    assert_eq!(pool.status().in_use, 1);
    drop(conn);
    assert_eq!(pool.status().available, 1);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(conn.checkout_count(), 2);
    assert_eq!(pool.status().created, 1);
    assert_eq!(server.handshakes().await.len(), 1);
}

#[tokio::test]
async fn test_checkout_pings_and_return_resets() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).build().await.unwrap();

    drop(pool.acquire().await.unwrap());
    wait_for(|| pool.status().available == 1).await;
    assert_eq!(count_commands(&server, Command::ResetConnection).await, 1);

    let _conn = pool.acquire().await.unwrap();
    assert_eq!(count_commands(&server, Command::Ping).await, 1);
}

#[tokio::test]
async fn test_checks_can_be_disabled() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .test_on_checkout(false)
        .reset_on_return(false)
        .build()
        .await
        .unwrap();

    drop(pool.acquire().await.unwrap());
    let conn = pool.acquire().await.unwrap();
    conn.query_drop("SELECT 1").await.unwrap();

    let commands = server.commands().await;
    assert_eq!(commands, vec![Command::Query as u8]);
}

#[tokio::test]
async fn test_acquisition_timeout() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .max_connections(1)
        .connection_timeout(Duration::from_millis(100))
        .build()
        .await
        .unwrap();

    let _held = pool.acquire().await.unwrap();
    match pool.acquire().await {
        Err(PoolError::AcquisitionTimeout(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_waiter_gets_returned_connection() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).max_connections(1).build().await.unwrap();

    let held = pool.acquire().await.unwrap();
    let id = held.id();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    assert_eq!(waiter.await.unwrap().unwrap(), id);
    assert_eq!(pool.status().created, 1);
}

#[tokio::test]
async fn test_detach_frees_the_slot() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).max_connections(1).build().await.unwrap();

    let conn = pool.acquire().await.unwrap().detach();
    assert_eq!(pool.status().total, 0);
    conn.ping().await.unwrap();

    let pooled = pool.acquire().await.unwrap();
    assert_eq!(pool.status().created, 2);
    drop(pooled);
}

// =============================================================================
// Result sets and transactions
// =============================================================================

#[tokio::test]
async fn test_dropped_result_then_query_on_same_connection() {
    let server = MockMySqlServer::builder()
        .with_response("SELECT * FROM big_table", big_table())
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let pool = builder(&server).max_connections(1).build().await.unwrap();

    let mut result = pool.query("SELECT * FROM big_table").await.unwrap();
    let first = result.connection().id();
    assert!(result.next_row().await.unwrap().is_some());
    drop(result);

    let mut result = pool.query("SELECT 1 AS a").await.unwrap();
    assert_eq!(result.connection().id(), first);
    let row = result.next_row().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("a").unwrap(), 1);
    assert!(result.next_row().await.unwrap().is_none());
}

#[tokio::test]
async fn test_pooled_result_next_result() {
    let server = MockMySqlServer::builder()
        .with_response(
            "CALL report()",
            MockResponse::Multi(vec![
                MockResponse::scalar("total", 10i64),
                MockResponse::affected(0),
            ]),
        )
        .build()
        .await
        .unwrap();
    let pool = builder(&server).build().await.unwrap();

    let mut result = pool.query("CALL report()").await.unwrap();
    let rows = result.collect_rows().await.unwrap();
    assert_eq!(rows[0].get::<i64>("total").unwrap(), 10);

    let last = result.next_result().await.unwrap().unwrap();
    assert!(!last.has_rows());
    assert!(last.next_result().await.unwrap().is_none());
}

#[tokio::test]
async fn test_pooled_transaction_commit() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).reset_on_return(false).build().await.unwrap();

    let mut tx = pool.begin(IsolationLevel::ReadCommitted).await.unwrap();
    tx.query("UPDATE t SET a = 1").await.unwrap();
    tx.commit().await.unwrap();
    drop(tx);

    assert_eq!(
        server.queries().await,
        vec![
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            "START TRANSACTION",
            "UPDATE t SET a = 1",
            "COMMIT",
        ]
    );
    assert_eq!(pool.status().available, 1);
}

#[tokio::test]
async fn test_dropped_pooled_transaction_rolls_back_before_reset() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).build().await.unwrap();

    {
        let tx = pool.begin(IsolationLevel::default()).await.unwrap();
        tx.query("DELETE FROM t").await.unwrap();
    }
    wait_for(|| pool.status().available == 1).await;

    let queries = server.queries().await;
    assert_eq!(queries.last().map(String::as_str), Some("ROLLBACK"));
    let commands = server.commands().await;
    assert_eq!(commands.last(), Some(&(Command::ResetConnection as u8)));
}

// =============================================================================
// Eviction
// =============================================================================

#[tokio::test]
async fn test_idle_connections_are_reaped() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .reset_on_return(false)
        .idle_timeout(Duration::from_millis(50))
        .reaper_interval(Duration::from_millis(20))
        .build()
        .await
        .unwrap();

    drop(pool.acquire().await.unwrap());
    assert_eq!(pool.status().available, 1);

    wait_for(|| pool.status().total == 0).await;
    assert_eq!(pool.status().retired, 1);
    wait_for(|| server.connection_count() == 0).await;
}

#[tokio::test]
async fn test_reaper_spares_connection_still_draining() {
    let rows = (0..20).map(|i| vec![SqlValue::Int(i)]).collect();
    let server = MockMySqlServer::builder()
        .with_response(
            "SELECT * FROM slow_table",
            MockResponse::SlowRows {
                columns: vec![ColumnDefinition::new("id", ColumnType::LongLong)],
                rows,
                interval: Duration::from_millis(20),
            },
        )
        .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1i64))
        .build()
        .await
        .unwrap();
    let pool = builder(&server)
        .max_connections(1)
        .reset_on_return(false)
        .test_on_checkout(false)
        .idle_timeout(Duration::from_millis(30))
        .reaper_interval(Duration::from_millis(10))
        .build()
        .await
        .unwrap();

    let result = pool.query("SELECT * FROM slow_table").await.unwrap();
    let first = result.connection().id();
    drop(result);
    assert_eq!(pool.status().available, 1);

    // Past the idle timeout several times over, with rows still arriving.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.available, 1);
    assert_eq!(status.retired, 0);

    let mut result = pool.query("SELECT 1 AS a").await.unwrap();
    assert_eq!(result.connection().id(), first);
    let row = result.next_row().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("a").unwrap(), 1);
    assert!(result.next_row().await.unwrap().is_none());
    assert_eq!(pool.status().created, 1);
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_reaper_keeps_min_connections() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .min_connections(1)
        .reset_on_return(false)
        .idle_timeout(Duration::from_millis(20))
        .max_lifetime(None)
        .reaper_interval(Duration::from_millis(10))
        .build()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.status().total, 1);
    assert_eq!(pool.status().retired, 0);
}

#[tokio::test]
async fn test_expired_connection_is_replaced() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server)
        .reset_on_return(false)
        .idle_timeout(None)
        .max_lifetime(Duration::from_millis(30))
        .reaper_interval(Duration::from_secs(60))
        .build()
        .await
        .unwrap();

    let first = pool.acquire().await.unwrap().id();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let conn = pool.acquire().await.unwrap();
    assert_ne!(conn.id(), first);
    assert_eq!(pool.status().retired, 1);
}

#[tokio::test]
async fn test_broken_connection_is_discarded() {
    let server = MockMySqlServer::builder()
        .with_response("KILL", MockResponse::Disconnect)
        .build()
        .await
        .unwrap();
    let pool = builder(&server).max_connections(1).build().await.unwrap();

    let err = pool.query("KILL").await.unwrap_err();
    assert!(err.as_client_error().is_some_and(|e| e.is_fatal() || e.is_transient()));

    let conn = pool.acquire().await.unwrap();
    conn.ping().await.unwrap();
    assert_eq!(pool.status().created, 2);
}

#[tokio::test]
async fn test_close_refuses_new_work() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let pool = builder(&server).build().await.unwrap();

    let held = pool.acquire().await.unwrap();
    pool.close().await;
    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
    assert!(matches!(
        pool.query("SELECT 1").await,
        Err(PoolError::PoolClosed)
    ));

    // Returned after close: retired instead of pooled.
    drop(held);
    wait_for(|| pool.status().total == 0).await;
}
