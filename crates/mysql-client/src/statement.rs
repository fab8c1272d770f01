//! Server-side prepared statements.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use mysql_protocol::ColumnDefinition;
use mysql_protocol::statement::{
    ExecuteParam, encode_close, encode_execute, encode_reset, encode_send_long_data,
};
use mysql_types::encode_param;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::params::{ParsedSql, Params};
use crate::processor::{Handle, Prepared};
use crate::result::ResultSet;
use crate::row::{Column, columns_from};

/// A prepared statement.
///
/// Placeholders are `?` (positional) and `:name` (named). Named
/// placeholders are rewritten to `?` before the SQL reaches the server.
///
/// ```rust,ignore
/// let stmt = conn.prepare("SELECT * FROM t WHERE a = ? AND b = :name").await?;
/// let mut result = stmt.execute(Params::new().push(5).bind("name", "x")).await?;
/// ```
///
/// Cloning is cheap and clones share the server-side statement. The
/// statement is closed when [`Statement::close`] is called or the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct Statement {
    inner: Arc<StatementInner>,
}

#[derive(Debug)]
struct StatementInner {
    handle: Handle,
    id: u32,
    sql: Arc<str>,
    parsed: ParsedSql,
    params: Vec<ColumnDefinition>,
    columns: Arc<[Column]>,
    warnings: u16,
    /// Slots filled with long data since the last execute or reset.
    long_data: Mutex<Vec<bool>>,
    closed: AtomicBool,
}

impl Statement {
    /// Prepare `sql` on the connection behind `handle`.
    pub(crate) async fn prepare(handle: &Handle, sql: &str) -> Result<Self> {
        let parsed = ParsedSql::parse(sql);
        let prepared = handle.prepare(parsed.sql()).await?;
        tracing::debug!(
            statement_id = prepared.statement_id,
            params = prepared.params.len(),
            columns = prepared.columns.len(),
            "prepared statement"
        );
        Ok(Self::new(handle.clone(), sql, parsed, prepared))
    }

    fn new(handle: Handle, sql: &str, parsed: ParsedSql, prepared: Prepared) -> Self {
        let slots = parsed.param_count();
        Self {
            inner: Arc::new(StatementInner {
                handle,
                id: prepared.statement_id,
                sql: Arc::from(sql),
                parsed,
                params: prepared.params,
                columns: columns_from(&prepared.columns),
                warnings: prepared.warnings,
                long_data: Mutex::new(vec![false; slots]),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Server-assigned statement id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// SQL text as given to `prepare`.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    /// Number of placeholders.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.inner.parsed.param_count()
    }

    /// Parameter definitions reported by the server.
    #[must_use]
    pub fn params(&self) -> &[ColumnDefinition] {
        &self.inner.params
    }

    /// Result columns reported by the server. Empty for statements that
    /// return no rows.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.inner.columns
    }

    /// Warnings raised while preparing.
    #[must_use]
    pub fn warnings(&self) -> u16 {
        self.inner.warnings
    }

    /// Whether [`Statement::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::StatementClosed);
        }
        Ok(())
    }

    /// Execute with positional and named values.
    ///
    /// Slots already filled through [`Statement::bind`] are skipped by
    /// positional values. Every parameter check happens before anything is
    /// sent.
    pub async fn execute(&self, params: impl Into<Params>) -> Result<ResultSet> {
        self.ensure_open()?;
        let payload = {
            let mut long_data = self.inner.long_data.lock();
            let values = self.inner.parsed.bind(params.into(), &long_data)?;
            let params: Vec<ExecuteParam> = values
                .iter()
                .map(|value| match value {
                    Some(value) => encode_param(value),
                    None => ExecuteParam::long_data(),
                })
                .collect();
            // The server drops long data once the statement runs.
            long_data.iter_mut().for_each(|bound| *bound = false);
            encode_execute(self.inner.id, &params)
        };
        self.inner
            .handle
            .execute(payload, Some(Arc::clone(&self.inner.sql)))
            .await
    }

    /// Stream `data` into parameter `index` with COM_STMT_SEND_LONG_DATA.
    ///
    /// May be called several times for one parameter; the chunks are
    /// appended. The server does not answer, so errors show up on the next
    /// execute.
    pub fn bind(&self, index: usize, data: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        let mut long_data = self.inner.long_data.lock();
        let Some(bound) = long_data.get_mut(index) else {
            return Err(Error::UnknownParameter(index.to_string()));
        };
        let param_id = u16::try_from(index).map_err(|_| Error::UnknownParameter(index.to_string()))?;
        self.inner
            .handle
            .send_no_reply(encode_send_long_data(self.inner.id, param_id, &data.into()))?;
        *bound = true;
        Ok(())
    }

    /// COM_STMT_RESET: discard long data sent so far.
    pub async fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.handle.simple(encode_reset(self.inner.id)).await?;
        self.inner.long_data.lock().iter_mut().for_each(|bound| *bound = false);
        Ok(())
    }

    /// Close the statement on the server. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Forget the server-side statement without sending anything. Used
    /// after COM_RESET_CONNECTION, which already dropped it.
    pub(crate) fn invalidate(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl StatementInner {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(statement_id = self.id, "closing statement");
        self.handle.send_no_reply(encode_close(self.id))
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        // A closed connection already released the statement.
        match self.close() {
            Ok(()) | Err(Error::ConnectionClosed) => {}
            Err(err) => tracing::debug!(statement_id = self.id, error = %err, "statement close failed"),
        }
    }
}
