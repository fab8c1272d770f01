//! The per-connection driver task.
//!
//! Every connection runs one task that owns the socket. Callers submit
//! [`Request`]s over an unbounded channel and get answers back on oneshot
//! channels. The task keeps a FIFO of responses it is waiting for and a
//! queue of commands it has not sent yet; a command goes on the wire only
//! when nothing is pending, so responses always match their requests.
//!
//! What the next packet means is decided by [`ParseMode`]:
//!
//! ```text
//! Idle ──command──> AwaitingResponse ──OK/ERR──> Idle
//!                        │
//!                        └─column count──> ColumnDefinitions{n} ──> Rows ──EOF/OK──> Idle
//!                                                                     └─MORE_RESULTS──> AwaitingResponse
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::{Buf, Bytes};
use futures_util::{SinkExt, StreamExt};
use mysql_codec::{Packet, PacketStream};
use mysql_protocol::codec::read_lenenc_int;
use mysql_protocol::command::encode_simple;
use mysql_protocol::packet::{EOF_HEADER, ERR_HEADER, MAX_PAYLOAD_SIZE, OK_HEADER, is_eof_packet};
use mysql_protocol::statement::encode_close;
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, Command, EofPacket, ErrPacket, OkPacket, PrepareOk,
    ProtocolError, ResponseKind,
};
use mysql_types::{decode_binary_row, decode_text_row};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::connect::Session;
use crate::error::{Error, Result};
use crate::metadata::ConnectionMetadata;
use crate::result::{Completion, ResultSet, RowEvent};
use crate::row::{Column, Row, columns_from};
use crate::state::{ConnectionState, ParseMode};
use crate::transport::BoxedTransport;

/// Chunk size used when streaming a local file to the server.
const LOCAL_INFILE_CHUNK: usize = 64 * 1024;

/// Row encoding of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowProtocol {
    /// Length-encoded strings (`COM_QUERY`).
    Text,
    /// Typed values with a null bitmap (`COM_STMT_EXECUTE`).
    Binary,
}

/// Server answer to `COM_STMT_PREPARE`.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub(crate) statement_id: u32,
    pub(crate) params: Vec<ColumnDefinition>,
    pub(crate) columns: Vec<ColumnDefinition>,
    pub(crate) warnings: u16,
}

/// Where the answer to a command goes.
pub(crate) enum Reply {
    Result {
        protocol: RowProtocol,
        sql: Option<Arc<str>>,
        tx: oneshot::Sender<Result<ResultSet>>,
    },
    Prepare {
        tx: oneshot::Sender<Result<Prepared>>,
    },
    Ok {
        tx: oneshot::Sender<Result<OkPacket>>,
    },
    FieldList {
        tx: oneshot::Sender<Result<Vec<ColumnDefinition>>>,
    },
}

impl Reply {
    fn into_pending(self) -> Pending {
        match self {
            Self::Result { protocol, sql, tx } => Pending::Result(ResultPending {
                protocol,
                sql,
                target: Some(Target::First(tx)),
                definitions: Vec::new(),
                columns: Arc::from(Vec::new()),
                rows: None,
            }),
            Self::Prepare { tx } => Pending::Prepare(PreparePending {
                tx: Some(tx),
                ok: PrepareOk::default(),
                params: Vec::new(),
                columns: Vec::new(),
            }),
            Self::Ok { tx } => Pending::Ok(Some(tx)),
            Self::FieldList { tx } => Pending::FieldList {
                tx: Some(tx),
                columns: Vec::new(),
            },
        }
    }

    fn fail(self, err: Error) {
        match self {
            Self::Result { tx, .. } => send_err(tx, err),
            Self::Prepare { tx } => send_err(tx, err),
            Self::Ok { tx } => send_err(tx, err),
            Self::FieldList { tx } => send_err(tx, err),
        }
    }
}

/// A request submitted to the driver task.
pub(crate) enum Request {
    /// A command the server answers.
    Command { payload: Bytes, reply: Reply },
    /// A command the server does not answer (long data, statement close).
    NoReply { payload: Bytes },
    /// Send `COM_QUIT` once everything before it is done.
    Quit { done: oneshot::Sender<()> },
}

impl Request {
    fn fail(self, err: Error) {
        match self {
            Self::Command { reply, .. } => reply.fail(err),
            Self::NoReply { .. } => {}
            Self::Quit { done } => drop(done.send(())),
        }
    }
}

/// Where the next result set of a command goes.
enum Target {
    First(oneshot::Sender<Result<ResultSet>>),
    Next(oneshot::Sender<Result<Option<ResultSet>>>),
}

impl Target {
    /// Hand out a result set. Returns `false` when nobody is listening.
    fn deliver(self, result: ResultSet) -> bool {
        match self {
            Self::First(tx) => tx.send(Ok(result)).is_ok(),
            Self::Next(tx) => tx.send(Ok(Some(result))).is_ok(),
        }
    }

    fn fail(self, err: Error) {
        match self {
            Self::First(tx) => send_err(tx, err),
            Self::Next(tx) => send_err(tx, err),
        }
    }

    /// No more result sets follow.
    fn finish(self) {
        if let Self::Next(tx) = self {
            let _ = tx.send(Ok(None));
        }
    }
}

struct ResultPending {
    protocol: RowProtocol,
    sql: Option<Arc<str>>,
    target: Option<Target>,
    definitions: Vec<ColumnDefinition>,
    columns: Arc<[Column]>,
    rows: Option<mpsc::UnboundedSender<RowEvent>>,
}

struct PreparePending {
    tx: Option<oneshot::Sender<Result<Prepared>>>,
    ok: PrepareOk,
    params: Vec<ColumnDefinition>,
    columns: Vec<ColumnDefinition>,
}

enum Pending {
    Result(ResultPending),
    Prepare(PreparePending),
    Ok(Option<oneshot::Sender<Result<OkPacket>>>),
    FieldList {
        tx: Option<oneshot::Sender<Result<Vec<ColumnDefinition>>>>,
        columns: Vec<ColumnDefinition>,
    },
}

impl Pending {
    fn fail(self, err: Error) {
        match self {
            Self::Result(mut p) => {
                if let Some(rows) = p.rows.take() {
                    let _ = rows.send(RowEvent::Failed(err.clone()));
                }
                if let Some(target) = p.target.take() {
                    target.fail(err);
                }
            }
            Self::Prepare(PreparePending { tx: Some(tx), .. }) => send_err(tx, err),
            Self::Ok(Some(tx)) => send_err(tx, err),
            Self::FieldList { tx: Some(tx), .. } => send_err(tx, err),
            _ => {}
        }
    }
}

fn send_err<T>(tx: oneshot::Sender<Result<T>>, err: Error) {
    let _ = tx.send(Err(err));
}

/// State shared between the driver task and connection handles.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<ConnectionState>,
    pub(crate) metadata: Mutex<ConnectionMetadata>,
    queued: AtomicUsize,
    busy: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            *state = next;
        }
    }
}

/// Cloneable sending side of a connection.
#[derive(Debug, Clone)]
pub(crate) struct Handle {
    requests: mpsc::UnboundedSender<Request>,
    shared: Arc<Shared>,
}

impl Handle {
    /// Spawn the driver task for an authenticated session.
    pub(crate) fn spawn(session: Session, local_infile: bool) -> Self {
        let connection_id = session.metadata.connection_id;
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Ready),
            metadata: Mutex::new(session.metadata),
            ..Shared::default()
        });
        let (requests, receiver) = mpsc::unbounded_channel();

        let processor = Processor {
            stream: session.stream,
            requests: receiver,
            shared: Arc::clone(&shared),
            capabilities: session.capabilities,
            local_infile,
            mode: ParseMode::Idle,
            pending: VecDeque::new(),
            deferred: VecDeque::new(),
            closing: false,
            running: true,
        };
        tokio::spawn(
            processor
                .run()
                .instrument(tracing::debug_span!("mysql_connection", connection_id)),
        );

        Self { requests, shared }
    }

    /// Queue a request.
    pub(crate) fn submit(&self, request: Request) -> Result<()> {
        if self.shared.state.lock().is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        self.requests.send(request).map_err(|_| {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            Error::ConnectionClosed
        })
    }

    /// Queue a text query without waiting for the answer.
    pub(crate) fn start_query(&self, sql: &str) -> Result<oneshot::Receiver<Result<ResultSet>>> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Command {
            payload: mysql_protocol::command::encode_query(sql),
            reply: Reply::Result {
                protocol: RowProtocol::Text,
                sql: Some(Arc::from(sql)),
                tx,
            },
        })?;
        Ok(rx)
    }

    /// Run a text query.
    pub(crate) async fn query(&self, sql: &str) -> Result<ResultSet> {
        let rx = self.start_query(sql)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Run a `COM_STMT_EXECUTE` payload.
    pub(crate) async fn execute(&self, payload: Bytes, sql: Option<Arc<str>>) -> Result<ResultSet> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Command {
            payload,
            reply: Reply::Result {
                protocol: RowProtocol::Binary,
                sql,
                tx,
            },
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Prepare a statement.
    pub(crate) async fn prepare(&self, sql: &str) -> Result<Prepared> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Command {
            payload: mysql_protocol::command::encode_prepare(sql),
            reply: Reply::Prepare { tx },
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Run a command answered by a single OK or ERR packet.
    pub(crate) async fn simple(&self, payload: Bytes) -> Result<OkPacket> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Command {
            payload,
            reply: Reply::Ok { tx },
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Run `COM_FIELD_LIST`.
    pub(crate) async fn field_list(&self, table: &str, wildcard: &str) -> Result<Vec<ColumnDefinition>> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Command {
            payload: mysql_protocol::command::encode_field_list(table, wildcard),
            reply: Reply::FieldList { tx },
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Queue a command the server does not answer.
    pub(crate) fn send_no_reply(&self, payload: Bytes) -> Result<()> {
        self.submit(Request::NoReply { payload })
    }

    /// Send `COM_QUIT` after outstanding work and wait for the socket to
    /// close.
    pub(crate) async fn quit(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        match self.submit(Request::Quit { done }) {
            Ok(()) => {
                let _ = rx.await;
                Ok(())
            }
            Err(Error::ConnectionClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Whether no command is queued or in flight, including unread rows of
    /// a dropped result set.
    pub(crate) fn is_idle(&self) -> bool {
        self.shared.queued.load(Ordering::Acquire) == 0 && !self.shared.busy.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub(crate) fn metadata(&self) -> ConnectionMetadata {
        self.shared.metadata.lock().clone()
    }

    pub(crate) fn shared_metadata(&self, update: impl FnOnce(&mut ConnectionMetadata)) {
        update(&mut self.shared.metadata.lock());
    }
}

/// The driver task itself.
struct Processor {
    stream: PacketStream<BoxedTransport>,
    requests: mpsc::UnboundedReceiver<Request>,
    shared: Arc<Shared>,
    capabilities: CapabilityFlags,
    local_infile: bool,
    mode: ParseMode,
    pending: VecDeque<Pending>,
    deferred: VecDeque<Request>,
    /// Every handle is gone; quit once idle.
    closing: bool,
    running: bool,
}

impl Processor {
    async fn run(mut self) {
        let error = loop {
            if !self.running {
                break None;
            }
            if self.closing && self.is_idle() {
                self.quit().await;
                break None;
            }

            tokio::select! {
                request = self.requests.recv(), if !self.closing => match request {
                    Some(request) => {
                        if let Err(err) = self.submit(request).await {
                            break Some(err);
                        }
                    }
                    None => {
                        tracing::debug!("all handles dropped, closing connection");
                        self.closing = true;
                        self.shared.set_state(ConnectionState::Closing);
                    }
                },
                packet = self.stream.next() => match packet {
                    Some(Ok(packet)) => {
                        if let Err(err) = self.on_packet(packet).await {
                            break Some(err);
                        }
                    }
                    Some(Err(err)) => break Some(err.into()),
                    None => break Some(Error::ConnectionClosed),
                },
            }
        };

        match error {
            Some(err) => {
                tracing::warn!(error = %err, pending = self.pending.len(), "connection failed");
                self.fail_all(&err);
            }
            None => self.fail_all(&Error::ConnectionClosed),
        }
        self.shared.set_state(ConnectionState::Closed);
        self.shared.busy.store(false, Ordering::Release);
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.deferred.is_empty() && self.mode.is_idle()
    }

    fn update_busy(&self) {
        self.shared.busy.store(!self.is_idle(), Ordering::Release);
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities.contains(CapabilityFlags::DEPRECATE_EOF)
    }

    async fn submit(&mut self, request: Request) -> Result<()> {
        self.deferred.push_back(request);
        self.shared.busy.store(true, Ordering::Release);
        self.shared.queued.fetch_sub(1, Ordering::AcqRel);
        self.dispatch().await
    }

    /// Send deferred commands while the connection is idle. No-reply
    /// commands do not wait for anything, so several may go out in a row.
    async fn dispatch(&mut self) -> Result<()> {
        while self.running && self.pending.is_empty() && self.mode.is_idle() {
            let Some(request) = self.deferred.pop_front() else {
                break;
            };
            match request {
                Request::Command { payload, reply } => {
                    self.write(payload).await?;
                    self.mode = ParseMode::AwaitingResponse;
                    self.pending.push_back(reply.into_pending());
                }
                Request::NoReply { payload } => self.write(payload).await?,
                Request::Quit { done } => {
                    self.quit().await;
                    let _ = done.send(());
                }
            }
        }
        self.update_busy();
        Ok(())
    }

    async fn write(&mut self, payload: Bytes) -> Result<()> {
        let command = payload.first().and_then(|&b| Command::from_u8(b).ok());
        tracing::debug!(command = ?command, len = payload.len(), "dispatching command");
        self.stream.codec_mut().reset_sequence();
        self.stream.send(payload).await?;
        Ok(())
    }

    async fn quit(&mut self) {
        self.shared.set_state(ConnectionState::Closing);
        self.stream.codec_mut().reset_sequence();
        if let Err(err) = self.stream.send(encode_simple(Command::Quit)).await {
            tracing::debug!(error = %err, "failed to send COM_QUIT");
        }
        let _ = self.stream.close().await;
        self.shared.set_state(ConnectionState::Closed);
        self.running = false;
        tracing::info!("connection closed");
    }

    fn fail_all(&mut self, err: &Error) {
        for pending in self.pending.drain(..) {
            pending.fail(err.clone());
        }
        for request in self.deferred.drain(..) {
            request.fail(err.clone());
        }
        self.mode = ParseMode::Idle;
    }

    async fn on_packet(&mut self, packet: Packet) -> Result<()> {
        tracing::trace!(
            sequence = packet.sequence,
            len = packet.payload.len(),
            mode = ?self.mode,
            "received packet"
        );

        let Some(mut head) = self.pending.pop_front() else {
            return Err(self.unsolicited(packet.payload));
        };
        let outcome = match &mut head {
            Pending::Result(p) => self.on_result(p, packet.payload).await,
            Pending::Prepare(p) => self.on_prepare(p, packet.payload),
            Pending::Ok(tx) => self.on_ok(tx, packet.payload),
            Pending::FieldList { tx, columns } => self.on_field_list(tx, columns, packet.payload),
        };
        match outcome {
            Ok(Step::Continue) => self.pending.push_front(head),
            Ok(Step::Done) => {
                self.mode = ParseMode::Idle;
                self.dispatch().await?;
            }
            Err(err) => {
                head.fail(err.clone());
                return Err(err);
            }
        }
        self.update_busy();
        Ok(())
    }

    /// A packet while no command is in flight. Servers send an ERR before
    /// dropping an idle connection (e.g. `wait_timeout`).
    fn unsolicited(&self, mut payload: Bytes) -> Error {
        if payload.first() == Some(&ERR_HEADER) {
            if let Ok(err) = ErrPacket::decode(&mut payload) {
                self.shared.metadata.lock().record_error(&err);
                return Error::Connection(format!(
                    "server closed the connection: [{}] {}",
                    err.code, err.message
                ));
            }
        }
        ProtocolError::UnexpectedPacket {
            header: payload.first().copied().unwrap_or_default(),
            context: "idle connection",
        }
        .into()
    }

    fn server_error(&self, mut payload: Bytes, sql: Option<&str>) -> Result<Error> {
        let err = ErrPacket::decode(&mut payload)?;
        self.shared.metadata.lock().record_error(&err);
        tracing::debug!(code = err.code, state = %err.sql_state, "server returned error");
        Ok(Error::server(err, sql))
    }

    fn is_terminator(&self, payload: &[u8]) -> bool {
        if self.deprecate_eof() {
            payload.first() == Some(&EOF_HEADER) && payload.len() < MAX_PAYLOAD_SIZE
        } else {
            is_eof_packet(payload)
        }
    }

    /// Decode the EOF or OK packet that ends a row stream.
    fn terminator(&self, mut payload: Bytes) -> Result<Completion> {
        if self.deprecate_eof() {
            let ok = OkPacket::decode(&mut payload, self.capabilities)?;
            self.shared.metadata.lock().record_ok(&ok);
            Ok(Completion::from(&ok))
        } else {
            let eof = EofPacket::decode(&mut payload)?;
            self.shared.metadata.lock().record_eof(eof.status, eof.warnings);
            Ok(Completion::from(eof))
        }
    }

    fn unexpected_mode(&self, context: &str) -> Error {
        ProtocolError::InvalidField {
            field: "parse mode",
            reason: format!("{:?} while reading {context}", self.mode),
        }
        .into()
    }

    async fn on_result(&mut self, p: &mut ResultPending, mut payload: Bytes) -> Result<Step> {
        match self.mode {
            ParseMode::AwaitingResponse => match ResponseKind::classify(&payload)? {
                ResponseKind::Ok => {
                    let ok = OkPacket::decode(&mut payload, self.capabilities)?;
                    self.shared.metadata.lock().record_ok(&ok);
                    let completion = Completion::from(&ok);
                    Self::deliver(p, Some(completion.clone()));
                    return Ok(self.complete(p, &completion));
                }
                ResponseKind::Err => {
                    let err = self.server_error(payload, p.sql.as_deref())?;
                    if let Some(target) = p.target.take() {
                        target.fail(err);
                    }
                    return Ok(Step::Done);
                }
                ResponseKind::LocalInfile => {
                    payload.advance(1);
                    let name = String::from_utf8_lossy(&payload).into_owned();
                    self.send_local_file(name).await?;
                }
                ResponseKind::Eof => {
                    return Err(ProtocolError::UnexpectedPacket {
                        header: EOF_HEADER,
                        context: "query response",
                    }
                    .into());
                }
                ResponseKind::ColumnCount => {
                    let count = read_lenenc_int(&mut payload)?;
                    if count == 0 {
                        return Err(ProtocolError::InvalidField {
                            field: "column count",
                            reason: "zero columns".into(),
                        }
                        .into());
                    }
                    p.definitions = Vec::with_capacity(count.min(1024) as usize);
                    self.mode = ParseMode::ColumnDefinitions { remaining: count };
                }
            },
            ParseMode::ColumnDefinitions { remaining: 0 } => {
                EofPacket::decode(&mut payload)?;
                Self::deliver(p, None);
                self.mode = ParseMode::Rows;
            }
            ParseMode::ColumnDefinitions { remaining } => {
                p.definitions.push(ColumnDefinition::decode(&mut payload)?);
                let remaining = remaining - 1;
                if remaining == 0 && self.deprecate_eof() {
                    Self::deliver(p, None);
                    self.mode = ParseMode::Rows;
                } else {
                    self.mode = ParseMode::ColumnDefinitions { remaining };
                }
            }
            ParseMode::Rows => {
                if payload.first() == Some(&ERR_HEADER) {
                    let err = self.server_error(payload, p.sql.as_deref())?;
                    if let Some(rows) = p.rows.take() {
                        let _ = rows.send(RowEvent::Failed(err));
                    }
                    if let Some(target) = p.target.take() {
                        target.finish();
                    }
                    return Ok(Step::Done);
                }
                if self.is_terminator(&payload) {
                    let completion = self.terminator(payload)?;
                    if let Some(rows) = p.rows.take() {
                        let _ = rows.send(RowEvent::Done(completion.clone()));
                    }
                    return Ok(self.complete(p, &completion));
                }
                match &p.rows {
                    Some(rows) if !rows.is_closed() => {
                        let values = match p.protocol {
                            RowProtocol::Text => decode_text_row(payload, &p.definitions),
                            RowProtocol::Binary => decode_binary_row(payload, &p.definitions),
                        }
                        .map_err(Error::Decode)?;
                        let _ = rows.send(RowEvent::Row(Row::new(Arc::clone(&p.columns), values)));
                    }
                    // Nobody reads this result anymore; skip the row.
                    _ => p.rows = None,
                }
            }
            _ => return Err(self.unexpected_mode("a result set")),
        }
        Ok(Step::Continue)
    }

    /// Columns are known: hand the result set to whoever waits for it.
    fn deliver(p: &mut ResultPending, completion: Option<Completion>) {
        p.columns = columns_from(&p.definitions);
        let complete = completion.is_some();
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (next_tx, next_rx) = oneshot::channel();
        let result = ResultSet::new(Arc::clone(&p.columns), rows_rx, next_rx, completion);

        let delivered = p
            .target
            .replace(Target::Next(next_tx))
            .is_some_and(|target| target.deliver(result));
        p.rows = (delivered && !complete).then_some(rows_tx);
    }

    /// A result set ended. Chain the next one or finish the command.
    fn complete(&mut self, p: &mut ResultPending, completion: &Completion) -> Step {
        if completion.has_more_results() {
            p.definitions.clear();
            p.rows = None;
            self.mode = ParseMode::AwaitingResponse;
            Step::Continue
        } else {
            if let Some(target) = p.target.take() {
                target.finish();
            }
            Step::Done
        }
    }

    async fn send_local_file(&mut self, name: String) -> Result<()> {
        if !self.local_infile {
            return Err(Error::LocalInfileDisabled(name));
        }
        tracing::debug!(file = %name, "sending local infile");

        match tokio::fs::File::open(&name).await {
            Ok(mut file) => {
                let mut buf = vec![0u8; LOCAL_INFILE_CHUNK];
                loop {
                    let n = file.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    self.stream.feed(Bytes::copy_from_slice(&buf[..n])).await?;
                }
            }
            // The server answers the empty file with an error of its own.
            Err(err) => tracing::warn!(file = %name, error = %err, "cannot open local infile"),
        }
        self.stream.send(Bytes::new()).await?;
        Ok(())
    }

    fn on_prepare(&mut self, p: &mut PreparePending, mut payload: Bytes) -> Result<Step> {
        match self.mode {
            ParseMode::AwaitingResponse => {
                if payload.first() == Some(&ERR_HEADER) {
                    let err = self.server_error(payload, None)?;
                    if let Some(tx) = p.tx.take() {
                        send_err(tx, err);
                    }
                    return Ok(Step::Done);
                }
                p.ok = PrepareOk::decode(&mut payload)?;
                p.params.reserve(usize::from(p.ok.num_params));
                p.columns.reserve(usize::from(p.ok.num_columns));
                if p.ok.num_params == 0 {
                    return Ok(self.after_params(p));
                }
                self.mode = ParseMode::PrepareParams {
                    remaining: p.ok.num_params,
                };
            }
            ParseMode::PrepareParams { remaining: 0 } => {
                EofPacket::decode(&mut payload)?;
                return Ok(self.after_params(p));
            }
            ParseMode::PrepareParams { remaining } => {
                p.params.push(ColumnDefinition::decode(&mut payload)?);
                let remaining = remaining - 1;
                if remaining == 0 && self.deprecate_eof() {
                    return Ok(self.after_params(p));
                }
                self.mode = ParseMode::PrepareParams { remaining };
            }
            ParseMode::PrepareColumns { remaining: 0 } => {
                EofPacket::decode(&mut payload)?;
                return Ok(self.finish_prepare(p));
            }
            ParseMode::PrepareColumns { remaining } => {
                p.columns.push(ColumnDefinition::decode(&mut payload)?);
                let remaining = remaining - 1;
                if remaining == 0 && self.deprecate_eof() {
                    return Ok(self.finish_prepare(p));
                }
                self.mode = ParseMode::PrepareColumns { remaining };
            }
            _ => return Err(self.unexpected_mode("a prepare response")),
        }
        Ok(Step::Continue)
    }

    fn after_params(&mut self, p: &mut PreparePending) -> Step {
        if p.ok.num_columns == 0 {
            return self.finish_prepare(p);
        }
        self.mode = ParseMode::PrepareColumns {
            remaining: p.ok.num_columns,
        };
        Step::Continue
    }

    fn finish_prepare(&mut self, p: &mut PreparePending) -> Step {
        let statement_id = p.ok.statement_id;
        let prepared = Prepared {
            statement_id,
            params: std::mem::take(&mut p.params),
            columns: std::mem::take(&mut p.columns),
            warnings: p.ok.warnings,
        };
        let delivered = p.tx.take().is_some_and(|tx| tx.send(Ok(prepared)).is_ok());
        if !delivered {
            // The caller gave up; do not leak the server-side statement.
            tracing::debug!(statement_id, "closing statement of a cancelled prepare");
            self.deferred.push_back(Request::NoReply {
                payload: encode_close(statement_id),
            });
        }
        Step::Done
    }

    fn on_ok(&mut self, tx: &mut Option<oneshot::Sender<Result<OkPacket>>>, mut payload: Bytes) -> Result<Step> {
        let outcome = match payload.first().copied() {
            Some(OK_HEADER) => {
                let ok = OkPacket::decode(&mut payload, self.capabilities)?;
                self.shared.metadata.lock().record_ok(&ok);
                Ok(ok)
            }
            Some(ERR_HEADER) => Err(self.server_error(payload, None)?),
            Some(header) => {
                return Err(ProtocolError::UnexpectedPacket {
                    header,
                    context: "command response",
                }
                .into());
            }
            None => return Err(ProtocolError::UnexpectedEof.into()),
        };
        if let Some(tx) = tx.take() {
            let _ = tx.send(outcome);
        }
        Ok(Step::Done)
    }

    fn on_field_list(
        &mut self,
        tx: &mut Option<oneshot::Sender<Result<Vec<ColumnDefinition>>>>,
        columns: &mut Vec<ColumnDefinition>,
        mut payload: Bytes,
    ) -> Result<Step> {
        let outcome = if payload.first() == Some(&ERR_HEADER) {
            Err(self.server_error(payload, None)?)
        } else if self.is_terminator(&payload) {
            self.terminator(payload)?;
            Ok(std::mem::take(columns))
        } else {
            columns.push(ColumnDefinition::decode(&mut payload)?);
            self.mode = ParseMode::FieldList;
            return Ok(Step::Continue);
        };
        if let Some(tx) = tx.take() {
            let _ = tx.send(outcome);
        }
        Ok(Step::Done)
    }
}

/// Whether the head command needs more packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}
