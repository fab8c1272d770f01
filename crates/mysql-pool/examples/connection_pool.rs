//! Connection pool example.
//!
//! Runs a batch of concurrent queries through a small pool and prints the
//! pool status along the way.
//!
//! # Running
//!
//! ```bash
//! export MYSQL_HOST=localhost
//! export MYSQL_USER=root
//! export MYSQL_PASSWORD=secret
//!
//! cargo run --example connection_pool
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mysql_client::{Config, IsolationLevel};
use mysql_driver_pool::{Pool, PoolConfig, PoolError};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".into());
    let user = std::env::var("MYSQL_USER").unwrap_or_else(|_| "root".into());
    let password = std::env::var("MYSQL_PASSWORD").unwrap_or_default();

    let client = Config::new().host(host).user(user).password(password);
    let pool_config = PoolConfig::new()
        .min_connections(2)
        .max_connections(5)
        .connection_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300));

    println!("Pool configuration:");
    println!("  Min connections: {}", pool_config.min_connections);
    println!("  Max connections: {}", pool_config.max_connections);
    println!("  Idle timeout: {:?}", pool_config.idle_timeout);
    println!();

    let pool = Pool::new(client, pool_config).await?;
    println!("After startup: {:?}", pool.status());

    let start = Instant::now();
    let mut tasks = Vec::new();
    for i in 0..20 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut result = pool.query(&format!("SELECT {i} AS n")).await?;
            let n: i64 = match result.next_row().await? {
                Some(row) => row.get("n").map_err(mysql_client::Error::from)?,
                None => 0,
            };
            Ok::<_, PoolError>(n)
        }));
    }
    let mut sum = 0;
    for task in tasks {
        sum += task.await??;
    }
    println!("20 queries in {:?}, sum = {sum}", start.elapsed());
    println!("After queries: {:?}", pool.status());

    let mut tx = pool.begin(IsolationLevel::ReadCommitted).await?;
    tx.query("SELECT 1").await?;
    tx.commit().await?;

    pool.close().await;
    println!("Closed: {:?}", pool.status());
    Ok(())
}
