//! The public connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use mysql_protocol::command::{encode_init_db, encode_simple};
use mysql_protocol::statement::{
    ExecuteParam, encode_close, encode_execute, encode_reset, encode_send_long_data,
};
use mysql_protocol::{CapabilityFlags, Command};
use mysql_types::{SqlValue, encode_param};
use parking_lot::Mutex;

use crate::config::Config;
use crate::connect;
use crate::error::{Error, Result};
use crate::metadata::ConnectionMetadata;
use crate::processor::Handle;
use crate::result::ResultSet;
use crate::row::{Column, columns_from};
use crate::state::ConnectionState;
use crate::statement::Statement;
use crate::statement_cache::StatementCache;
use crate::transaction::{IsolationLevel, Transaction};

/// A connection to a MySQL server.
///
/// `Connection` is a cheap handle: clones share one socket and one driver
/// task, and commands from all clones run strictly in submission order.
/// The connection sends COM_QUIT once the last clone and the last
/// [`Statement`] created from it are dropped.
///
/// While a [`Transaction`] is open, commands sent through any clone fail
/// with [`Error::TransactionActive`]; run them through the transaction.
///
/// ```rust,ignore
/// use mysql_client::{Config, Connection};
///
/// let conn = Connection::connect(Config::new().host("localhost").user("app")).await?;
/// let mut result = conn.query("SELECT 1 AS a").await?;
/// let row = result.next_row().await?.unwrap();
/// assert_eq!(row.get::<i64>("a")?, 1);
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    handle: Handle,
    cache: Mutex<StatementCache>,
    address: String,
    in_transaction: AtomicBool,
}

impl Connection {
    /// Connect and authenticate.
    ///
    /// Applies `sql_mode` and selects the database (when the server did not
    /// accept it in the handshake) before returning.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut state = ConnectionState::Unconnected;
        let session = match connect::establish(&config, &mut state).await {
            Ok(session) => session,
            Err(err) => {
                let _ = state.transition(ConnectionState::Closed);
                tracing::debug!(address = %config.address(), error = %err, "connection attempt failed");
                return Err(err);
            }
        };
        let select_db = !session.capabilities.contains(CapabilityFlags::CONNECT_WITH_DB);

        let conn = Self {
            inner: Arc::new(ConnectionInner {
                handle: Handle::spawn(session, config.local_infile),
                cache: Mutex::new(StatementCache::new(config.statement_cache_size)),
                address: config.address(),
                in_transaction: AtomicBool::new(false),
            }),
        };

        if let Some(database) = config.database.as_deref().filter(|_| select_db) {
            conn.use_database(database).await?;
        }
        if let Some(mode) = &config.sql_mode {
            conn.query_drop(&sql_mode_statement(mode)).await?;
        }
        Ok(conn)
    }

    fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    fn ensure_free(&self) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::TransactionActive);
        }
        Ok(())
    }

    /// Whether a [`Transaction`] is open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::Acquire)
    }

    /// Claim the connection for a transaction. Fails if one is open.
    pub(crate) fn claim_transaction(&self) -> Result<()> {
        self.inner
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(|_| Error::TransactionActive)
    }

    pub(crate) fn release_transaction(&self) {
        self.inner.in_transaction.store(false, Ordering::Release);
    }

    /// Run a text query (COM_QUERY).
    ///
    /// Returns once the column definitions of the first result set are
    /// known. Rows stream in afterwards.
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.ensure_free()?;
        self.handle().query(sql).await
    }

    /// Run a query and discard every result set it produces.
    pub async fn query_drop(&self, sql: &str) -> Result<()> {
        self.ensure_free()?;
        self.query_drop_unchecked(sql).await
    }

    /// [`query`](Self::query) without the transaction gate.
    pub(crate) async fn query_unchecked(&self, sql: &str) -> Result<ResultSet> {
        self.handle().query(sql).await
    }

    pub(crate) async fn query_drop_unchecked(&self, sql: &str) -> Result<()> {
        let mut next = Some(self.query_unchecked(sql).await?);
        while let Some(mut result) = next {
            while result.next_row().await?.is_some() {}
            next = result.next_result().await?;
        }
        Ok(())
    }

    /// Queue a query without waiting for its answer.
    pub(crate) fn start_query(&self, sql: &str) -> Result<()> {
        self.handle().start_query(sql).map(drop)
    }

    /// Prepare a statement (COM_STMT_PREPARE).
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        self.ensure_free()?;
        self.prepare_unchecked(sql).await
    }

    pub(crate) async fn prepare_unchecked(&self, sql: &str) -> Result<Statement> {
        Statement::prepare(self.handle(), sql).await
    }

    /// Prepare a statement through the per-connection LRU cache.
    ///
    /// A statement evicted from the cache is closed on the server, so
    /// clones of it held elsewhere stop working.
    pub async fn prepare_cached(&self, sql: &str) -> Result<Statement> {
        self.ensure_free()?;
        if let Some(stmt) = self.inner.cache.lock().get(sql) {
            return Ok(stmt);
        }
        let stmt = self.prepare(sql).await?;
        let evicted = self.inner.cache.lock().insert(stmt.clone());
        if let Some(evicted) = evicted {
            tracing::debug!(statement_id = evicted.id(), "evicted cached statement");
            evicted.close()?;
        }
        Ok(stmt)
    }

    /// Number of statements in the statement cache.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// Execute a prepared statement by id with positional values
    /// (COM_STMT_EXECUTE).
    ///
    /// [`Statement::execute`] is the checked variant; this sends exactly the
    /// values given.
    pub async fn execute(&self, statement_id: u32, params: &[SqlValue]) -> Result<ResultSet> {
        self.ensure_free()?;
        let params: Vec<ExecuteParam> = params.iter().map(encode_param).collect();
        self.handle()
            .execute(encode_execute(statement_id, &params), None)
            .await
    }

    /// Send long data for one parameter (COM_STMT_SEND_LONG_DATA). The
    /// server does not answer.
    pub fn send_long_data(&self, statement_id: u32, param_id: u16, data: impl Into<Bytes>) -> Result<()> {
        self.handle()
            .send_no_reply(encode_send_long_data(statement_id, param_id, &data.into()))
    }

    /// Close a prepared statement by id (COM_STMT_CLOSE). The server does
    /// not answer.
    pub fn close_statement(&self, statement_id: u32) -> Result<()> {
        self.handle().send_no_reply(encode_close(statement_id))
    }

    /// Reset a prepared statement by id (COM_STMT_RESET).
    pub async fn reset_statement(&self, statement_id: u32) -> Result<()> {
        self.handle().simple(encode_reset(statement_id)).await.map(drop)
    }

    /// Change the default database (COM_INIT_DB).
    pub async fn use_database(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidIdentifier("database name cannot be empty".into()));
        }
        self.ensure_free()?;
        tracing::debug!(database = name, "selecting database");
        self.handle().simple(encode_init_db(name)).await?;
        self.handle().shared_metadata(|meta| meta.session.schema = Some(name.to_owned()));
        Ok(())
    }

    /// Check that the server is alive (COM_PING).
    pub async fn ping(&self) -> Result<()> {
        self.handle().simple(encode_simple(Command::Ping)).await.map(drop)
    }

    /// Reset the session (COM_RESET_CONNECTION).
    ///
    /// Rolls back any transaction, drops temporary tables and user
    /// variables, and releases every prepared statement. Cached statements
    /// are forgotten.
    pub async fn reset_connection(&self) -> Result<()> {
        self.ensure_free()?;
        self.handle()
            .simple(encode_simple(Command::ResetConnection))
            .await?;
        for stmt in self.inner.cache.lock().clear() {
            stmt.invalidate();
        }
        tracing::debug!("connection reset");
        Ok(())
    }

    /// Column definitions of `table` matching `wildcard` (COM_FIELD_LIST).
    pub async fn list_fields(&self, table: &str, wildcard: &str) -> Result<Vec<Column>> {
        let definitions = self.handle().field_list(table, wildcard).await?;
        Ok(columns_from(&definitions).to_vec())
    }

    /// Start a transaction. Only one can be open per connection.
    pub async fn begin(&self, isolation_level: IsolationLevel) -> Result<Transaction> {
        Transaction::begin(self.clone(), isolation_level).await
    }

    /// Send COM_QUIT after every queued command and close the socket.
    ///
    /// Other clones and statements of this connection fail with
    /// [`Error::ConnectionClosed`] afterwards.
    pub async fn close(&self) -> Result<()> {
        for stmt in self.inner.cache.lock().clear() {
            stmt.invalidate();
        }
        self.handle().quit().await
    }

    /// Whether no command is queued or in flight, including the discarding
    /// of a dropped result set.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.handle().is_idle()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle().state()
    }

    /// Whether the connection has been closed, by request or by a fatal
    /// error.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Snapshot of server information and the last command's outcome.
    #[must_use]
    pub fn metadata(&self) -> ConnectionMetadata {
        self.handle().metadata()
    }

    /// `host:port` or socket path.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.inner.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// `SET SESSION sql_mode = '...'` with the mode quoted as a string literal.
fn sql_mode_statement(mode: &str) -> String {
    let escaped = mode.replace('\\', "\\\\").replace('\'', "\\'");
    format!("SET SESSION sql_mode = '{escaped}'")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_mode_statement() {
        assert_eq!(
            sql_mode_statement("STRICT_ALL_TABLES,NO_ZERO_DATE"),
            "SET SESSION sql_mode = 'STRICT_ALL_TABLES,NO_ZERO_DATE'"
        );
        assert_eq!(
            sql_mode_statement("x'; DROP TABLE t; --"),
            "SET SESSION sql_mode = 'x\\'; DROP TABLE t; --'"
        );
    }

    #[tokio::test]
    async fn test_connect_refused_reports_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::connect(Config::new().host("127.0.0.1").port(port))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
