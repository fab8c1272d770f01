//! Transaction support.
//!
//! This module provides transaction isolation levels, savepoint support,
//! and the [`Transaction`] guard.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::result::ResultSet;
use crate::statement::Statement;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,

    /// Read committed.
    ///
    /// Transactions can only read committed data. Prevents dirty reads
    /// but allows non-repeatable reads and phantom reads.
    ReadCommitted,

    /// Repeatable read (default for InnoDB).
    ///
    /// Consistent reads within the transaction see the snapshot taken by
    /// the first read.
    #[default]
    RepeatableRead,

    /// Serializable (highest isolation).
    ///
    /// Plain `SELECT`s become locking reads.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL statement to set this isolation level for the next
    /// transaction.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }

    /// Get the isolation level name as used by MySQL.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// A savepoint within a transaction.
///
/// Savepoints allow partial rollbacks within a transaction.
/// The savepoint name is validated when created to prevent SQL injection.
///
/// # Example
///
/// ```rust,ignore
/// let mut tx = conn.begin(IsolationLevel::default()).await?;
///
/// tx.query("INSERT INTO orders (customer_id) VALUES (42)").await?;
/// let sp = tx.savepoint("before_items").await?;
///
/// tx.query("INSERT INTO items (order_id, product_id) VALUES (1, 100)").await?;
///
/// // Undo the items but keep the order
/// tx.rollback_to(&sp).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePoint {
    name: String,
}

impl SavePoint {
    /// Get the savepoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,63}$").unwrap()
});

/// Validate an identifier (savepoint name, etc.) to prevent SQL injection.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidIdentifier("identifier cannot be empty".into()));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::InvalidIdentifier(format!(
            "invalid identifier '{name}': must start with letter/underscore, \
             contain only alphanumerics/_/$, and be 1-64 characters"
        )));
    }
    Ok(())
}

fn savepoint_sql(name: &str) -> String {
    format!("SAVEPOINT {name}")
}

fn rollback_to_sql(name: &str) -> String {
    format!("ROLLBACK TO SAVEPOINT {name}")
}

fn release_sql(name: &str) -> String {
    format!("RELEASE SAVEPOINT {name}")
}

/// An open transaction on one connection.
///
/// The transaction holds the connection exclusively: commands sent through
/// other clones of the [`Connection`] fail with
/// [`Error::TransactionActive`] until it finishes.
///
/// Dropping an unfinished transaction queues a `ROLLBACK`.
#[derive(Debug)]
pub struct Transaction {
    conn: Connection,
    isolation_level: IsolationLevel,
    depth: usize,
    finished: bool,
}

impl Transaction {
    /// Set the isolation level, then `START TRANSACTION`.
    pub(crate) async fn begin(conn: Connection, isolation_level: IsolationLevel) -> Result<Self> {
        conn.claim_transaction()?;
        tracing::debug!(isolation_level = %isolation_level.name(), "beginning transaction");
        let started = async {
            conn.query_drop_unchecked(isolation_level.as_sql()).await?;
            conn.query_drop_unchecked("START TRANSACTION").await
        }
        .await;
        if let Err(err) = started {
            conn.release_transaction();
            return Err(err);
        }
        Ok(Self {
            conn,
            isolation_level,
            depth: 0,
            finished: false,
        })
    }

    /// Get the isolation level of this transaction.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Whether commit or rollback already ran.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of open nested levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The connection the transaction runs on.
    ///
    /// Its query methods are refused until the transaction finishes.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::TransactionFinished);
        }
        Ok(())
    }

    /// Run a text query inside the transaction.
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.ensure_open()?;
        self.conn.query_unchecked(sql).await
    }

    /// Run a query inside the transaction and discard its results.
    pub async fn query_drop(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.conn.query_drop_unchecked(sql).await
    }

    /// Prepare a statement on the transaction's connection.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.ensure_open()?;
        self.conn.prepare_unchecked(sql).await
    }

    /// Commit the transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    /// Roll the transaction back.
    pub async fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(statement = sql, "finishing transaction");
        self.finished = true;
        let result = self.conn.query_drop_unchecked(sql).await;
        self.conn.release_transaction();
        result
    }

    /// Create a savepoint.
    pub async fn savepoint(&mut self, name: &str) -> Result<SavePoint> {
        self.ensure_open()?;
        validate_identifier(name)?;
        tracing::debug!(name = name, "creating savepoint");
        self.conn.query_drop_unchecked(&savepoint_sql(name)).await?;
        Ok(SavePoint { name: name.to_owned() })
    }

    /// Start a nested transaction on a generated savepoint.
    ///
    /// The returned guard borrows the transaction, so the outer level is
    /// unusable until the nested one commits, rolls back or is dropped.
    pub async fn nested(&mut self) -> Result<NestedTransaction<'_>> {
        let name = format!("sp_{}", self.depth + 1);
        let savepoint = self.savepoint(&name).await?;
        self.depth += 1;
        Ok(NestedTransaction {
            tx: self,
            savepoint,
            finished: false,
        })
    }

    /// Roll back to a savepoint. The savepoint stays valid.
    pub async fn rollback_to(&mut self, savepoint: &SavePoint) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(name = savepoint.name(), "rolling back to savepoint");
        self.conn
            .query_drop_unchecked(&rollback_to_sql(savepoint.name()))
            .await
    }

    /// Release a savepoint, keeping its changes.
    pub async fn release(&mut self, savepoint: SavePoint) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(name = savepoint.name(), "releasing savepoint");
        self.conn
            .query_drop_unchecked(&release_sql(savepoint.name()))
            .await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("transaction dropped without commit or rollback, rolling back");
        if let Err(err) = self.conn.start_query("ROLLBACK") {
            tracing::debug!(error = %err, "could not queue rollback");
        }
        self.conn.release_transaction();
    }
}

/// A nested level of a [`Transaction`], backed by a savepoint.
///
/// Committing releases the savepoint; rolling back returns to it. Dropping
/// an unfinished level queues a `ROLLBACK TO SAVEPOINT`.
#[derive(Debug)]
pub struct NestedTransaction<'a> {
    tx: &'a mut Transaction,
    savepoint: SavePoint,
    finished: bool,
}

impl NestedTransaction<'_> {
    /// The savepoint this level rolls back to.
    #[must_use]
    pub fn savepoint(&self) -> &SavePoint {
        &self.savepoint
    }

    /// Run a text query inside this level.
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.tx.query(sql).await
    }

    /// Run a query inside this level and discard its results.
    pub async fn query_drop(&self, sql: &str) -> Result<()> {
        self.tx.query_drop(sql).await
    }

    /// Prepare a statement on the transaction's connection.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.tx.prepare(sql).await
    }

    /// Open a deeper level.
    pub async fn nested(&mut self) -> Result<NestedTransaction<'_>> {
        self.tx.nested().await
    }

    /// Keep this level's changes (`RELEASE SAVEPOINT`).
    pub async fn commit(mut self) -> Result<()> {
        let sql = release_sql(self.savepoint.name());
        self.finish(&sql).await
    }

    /// Undo this level's changes (`ROLLBACK TO SAVEPOINT`).
    pub async fn rollback(mut self) -> Result<()> {
        let sql = rollback_to_sql(self.savepoint.name());
        self.finish(&sql).await
    }

    async fn finish(&mut self, sql: &str) -> Result<()> {
        self.tx.ensure_open()?;
        self.finished = true;
        self.tx.depth = self.tx.depth.saturating_sub(1);
        tracing::debug!(statement = sql, "finishing nested transaction");
        self.tx.conn.query_drop_unchecked(sql).await
    }
}

impl Drop for NestedTransaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.tx.finished {
            return;
        }
        self.tx.depth = self.tx.depth.saturating_sub(1);
        tracing::warn!(
            name = self.savepoint.name(),
            "nested transaction dropped without commit or rollback, rolling back"
        );
        if let Err(err) = self.tx.conn.start_query(&rollback_to_sql(self.savepoint.name())) {
            tracing::debug!(error = %err, "could not queue rollback to savepoint");
        }
    }
}
