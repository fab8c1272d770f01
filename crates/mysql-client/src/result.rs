//! Streaming result sets.
//!
//! A [`ResultSet`] is handed out once its column definitions have been
//! read. Rows then arrive through an unbounded channel fed by the
//! connection's driver task, so they are buffered when nobody is reading.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use mysql_protocol::{EofPacket, OkPacket, StatusFlags};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::row::{Column, Row};

/// Summary sent by the server at the end of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Rows changed by the statement.
    pub affected_rows: u64,
    /// `AUTO_INCREMENT` value generated by the statement.
    pub last_insert_id: u64,
    /// Warning count.
    pub warnings: u16,
    /// Server status flags.
    pub status: StatusFlags,
    /// Human readable info string, e.g. `Rows matched: 1  Changed: 1`.
    pub info: String,
}

impl Completion {
    /// Whether another result set follows this one.
    #[must_use]
    pub fn has_more_results(&self) -> bool {
        self.status.contains(StatusFlags::MORE_RESULTS_EXISTS)
    }
}

impl From<&OkPacket> for Completion {
    fn from(ok: &OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status: ok.status,
            info: ok.info.clone(),
        }
    }
}

impl From<EofPacket> for Completion {
    fn from(eof: EofPacket) -> Self {
        Self {
            warnings: eof.warnings,
            status: eof.status,
            ..Self::default()
        }
    }
}

/// Message from the driver task to a result set.
#[derive(Debug)]
pub(crate) enum RowEvent {
    Row(Row),
    Done(Completion),
    Failed(Error),
}

pub(crate) type NextResult = oneshot::Receiver<Result<Option<ResultSet>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    /// Columns known, rows may still arrive.
    Fetched,
    /// Terminator seen (or the result failed).
    Complete,
}

/// One result set of a query or statement execution.
///
/// Statements that return no rows (`INSERT`, `UPDATE`, ...) produce a
/// result set with no columns that is already complete.
///
/// ```rust,ignore
/// let mut result = conn.query("SELECT id, name FROM users").await?;
/// while let Some(row) = result.next_row().await? {
///     let id: i64 = row.get("id")?;
/// }
/// assert!(result.next_result().await?.is_none());
/// ```
///
/// Dropping a result set before reading every row is fine: the driver task
/// discards the remaining rows (and any following result sets) before the
/// connection runs its next command.
#[derive(Debug)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: mpsc::UnboundedReceiver<RowEvent>,
    next: Option<NextResult>,
    state: ProxyState,
    completion: Completion,
}

impl ResultSet {
    pub(crate) fn new(
        columns: Arc<[Column]>,
        rows: mpsc::UnboundedReceiver<RowEvent>,
        next: NextResult,
        completion: Option<Completion>,
    ) -> Self {
        let state = if completion.is_some() {
            ProxyState::Complete
        } else {
            ProxyState::Fetched
        };
        Self {
            columns,
            rows,
            next: Some(next),
            state,
            completion: completion.unwrap_or_default(),
        }
    }

    /// Column metadata.
    ///
    /// Always available: a result set is only handed out after its column
    /// definitions were read.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Whether the result set has rows (that is, columns).
    #[must_use]
    pub fn has_rows(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Whether every row has been read.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ProxyState::Complete
    }

    /// Read the next row, or `None` once the result set is complete.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.is_complete() {
            return Ok(None);
        }
        let event = self.rows.recv().await;
        self.accept(event)
    }

    fn accept(&mut self, event: Option<RowEvent>) -> Result<Option<Row>> {
        match event {
            Some(RowEvent::Row(row)) => Ok(Some(row)),
            Some(RowEvent::Done(completion)) => {
                self.completion = completion;
                self.state = ProxyState::Complete;
                Ok(None)
            }
            Some(RowEvent::Failed(err)) => {
                self.state = ProxyState::Complete;
                Err(err)
            }
            None => {
                self.state = ProxyState::Complete;
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Read all remaining rows.
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Move on to the next result set of a multi-statement query or a
    /// stored procedure call.
    ///
    /// Fails with [`Error::ResultNotConsumed`] while rows of this result set
    /// are unread. Returns `None` when there are no more result sets.
    pub async fn next_result(&mut self) -> Result<Option<ResultSet>> {
        if !self.is_complete() {
            return Err(Error::ResultNotConsumed);
        }
        match self.next.take() {
            Some(next) => next.await.map_err(|_| Error::ConnectionClosed)?,
            None => Ok(None),
        }
    }

    /// Rows affected by the statement. Zero until the result is complete.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.completion.affected_rows
    }

    /// Last insert id. Zero until the result is complete.
    #[must_use]
    pub fn last_insert_id(&self) -> u64 {
        self.completion.last_insert_id
    }

    /// Warning count.
    #[must_use]
    pub fn warnings(&self) -> u16 {
        self.completion.warnings
    }

    /// Server status flags from the terminating packet.
    #[must_use]
    pub fn status(&self) -> StatusFlags {
        self.completion.status
    }

    /// The terminating packet's info string.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.completion.info
    }
}

impl Stream for ResultSet {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.is_complete() {
            return Poll::Ready(None);
        }
        let event = ready!(this.rows.poll_recv(cx));
        Poll::Ready(this.accept(event).transpose())
    }
}
