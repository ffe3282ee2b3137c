//! # Connection Engine
//!
//! One task per connection reads frames and dispatches them. Unbind, Abandon
//! and extended operations run inline on the read loop; every other request
//! becomes a task that may complete out of order.
//!
//! A Bind first interrupts everything outstanding and then runs as a
//! [`BindOperation`] task. Until it answers, further requests are queued
//! rather than processed; Unbind and Abandon are still handled immediately,
//! so an Unbind or a server shutdown cancels a slow bind.
//!
//! Writes from all tasks go through a shared [`FrameWriter`], which holds the
//! write half behind a mutex so frames are never interleaved.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::ber::Element;
use crate::core::codec::LdapCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dn::Dn;
use crate::protocol::message::{
    decode_abandon, extended_response, notice_of_disconnection, oids, tags, BindRequest,
    ExtendedRequest, LdapMessage, LdapResponse,
};
use crate::protocol::result::{LdapError, ResultCode};
use crate::service::operation::{BindOperation, Operation};
use crate::service::ServerContext;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout_error;

/// Any duplex byte stream a connection can run over
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedStream = Box<dyn AsyncStream>;

type Reader = FramedRead<ReadHalf<BoxedStream>, LdapCodec>;

/// Serialized access to the write half of a connection
#[derive(Clone)]
pub struct FrameWriter {
    inner: Arc<tokio::sync::Mutex<Option<WriteHalf<BoxedStream>>>>,
}

impl FrameWriter {
    fn new(half: WriteHalf<BoxedStream>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(Some(half))),
        }
    }

    /// Wrap `op` in an envelope and write it
    pub async fn send(&self, message_id: i32, op: Element) -> Result<()> {
        let bytes = LdapMessage::new(message_id, op).to_element().to_bytes();
        self.send_raw(bytes).await
    }

    /// Write one already-encoded frame.
    ///
    /// The write runs on its own task while holding the lock, so a caller
    /// that is cancelled mid-write cannot leave a partial frame on the wire.
    pub async fn send_raw(&self, bytes: Bytes) -> Result<()> {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        let write = tokio::spawn(async move {
            let half = guard
                .as_mut()
                .ok_or_else(|| ProtocolError::TransportError(constants::ERR_WRITER_GONE.into()))?;
            half.write_all(&bytes).await?;
            half.flush().await?;
            global_metrics().message_sent(bytes.len() as u64);
            Ok(())
        });
        write
            .await
            .map_err(|e| ProtocolError::TransportError(e.to_string()))?
    }

    async fn take(&self) -> Option<WriteHalf<BoxedStream>> {
        self.inner.lock().await.take()
    }

    async fn install(&self, half: WriteHalf<BoxedStream>) {
        *self.inner.lock().await = Some(half);
    }

    async fn shutdown(&self) {
        if let Some(mut half) = self.take().await {
            if let Err(e) = half.shutdown().await {
                debug!(error = %e, "Error shutting down write half");
            }
        }
    }
}

/// Requests currently being processed, keyed by message ID
#[derive(Default)]
pub(crate) struct InFlight {
    next: Mutex<u64>,
    tasks: Mutex<HashMap<i32, (u64, CancellationToken)>>,
}

impl InFlight {
    /// Track `message_id`; the returned sequence number identifies this registration
    pub(crate) fn register(&self, message_id: i32, parent: &CancellationToken) -> (u64, CancellationToken) {
        let seq = {
            let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let token = parent.child_token();
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message_id, (seq, token.clone()));
        (seq, token)
    }

    /// Forget `message_id` if it still refers to registration `seq`
    pub(crate) fn finish(&self, message_id: i32, seq: u64) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.get(&message_id).is_some_and(|(s, _)| *s == seq) {
            tasks.remove(&message_id);
        }
    }

    /// Cancel one request; false if it is not outstanding
    pub(crate) fn cancel(&self, message_id: i32) -> bool {
        let entry = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&message_id);
        match entry {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything; returns how many requests were interrupted
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, (_, token)) in &drained {
            token.cancel();
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Authentication state of a connection
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub bound_dn: Option<Dn>,
    pub version: i32,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            bound_dn: None,
            version: crate::config::LDAP_VERSION,
        }
    }
}

/// Session shared between the read loop and the bind task that replaces it
pub(crate) type SharedSession = Arc<Mutex<Session>>;

enum Flow {
    Continue,
    Close,
    StartTls,
}

/// A bind that has not answered yet
struct PendingBind {
    task: JoinHandle<()>,
    token: CancellationToken,
}

/// Resolves once the pending bind task ends; never resolves when there is none
async fn bind_finished(pending: &mut Option<PendingBind>) {
    match pending {
        Some(bind) => {
            if let Err(e) = (&mut bind.task).await {
                debug!(error = %e, "Bind task ended abnormally");
            }
            *pending = None;
        }
        None => std::future::pending().await,
    }
}

/// Per-connection state
pub struct Connection {
    ctx: Arc<ServerContext>,
    peer: String,
    writer: FrameWriter,
    in_flight: Arc<InFlight>,
    session: SharedSession,
    bind: Option<PendingBind>,
    deferred: VecDeque<LdapMessage>,
    tls_active: bool,
    shutdown: CancellationToken,
}

impl Connection {
    /// Serve one client until it unbinds, disconnects, violates the protocol
    /// or `shutdown` fires.
    #[instrument(skip_all, fields(peer = %peer))]
    pub async fn serve(
        ctx: Arc<ServerContext>,
        stream: BoxedStream,
        peer: String,
        tls_active: bool,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::new(read_half, LdapCodec::new(ctx.max_message_size));
        let connection = Connection {
            ctx,
            peer,
            writer: FrameWriter::new(write_half),
            in_flight: Arc::new(InFlight::default()),
            session: SharedSession::default(),
            bind: None,
            deferred: VecDeque::new(),
            tls_active,
            shutdown,
        };

        global_metrics().connection_established();
        let result = connection.run(reader).await;
        global_metrics().connection_closed();
        result
    }

    async fn run(mut self, mut reader: Reader) -> Result<()> {
        info!(tls = self.tls_active, "Connection opened");
        let result = loop {
            let message = match self.next_deferred() {
                Some(message) => message,
                None => {
                    let frame = tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            let notice = notice_of_disconnection(ResultCode::Unavailable, "Server is shutting down");
                            let _ = self.writer.send_raw(notice.to_bytes()).await;
                            break Ok(());
                        }
                        _ = bind_finished(&mut self.bind) => continue,
                        frame = reader.next() => frame,
                    };

                    let element = match frame {
                        None => break Ok(()),
                        Some(Ok(element)) => element,
                        Some(Err(e)) => break Err(e),
                    };
                    global_metrics().message_received(element.encoded_len() as u64);
                    match LdapMessage::decode(element) {
                        Ok(message) => message,
                        Err(e) => break Err(e),
                    }
                }
            };

            let flow = self.dispatch(message).await;
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break Ok(()),
                Ok(Flow::StartTls) => match self.upgrade(reader).await {
                    Ok(upgraded) => reader = upgraded,
                    Err(e) => {
                        global_metrics().tls_handshake(false);
                        self.close().await;
                        warn!(error = %e, "StartTLS handshake failed");
                        return Err(e);
                    }
                },
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            if e.is_disconnect() {
                debug!("Peer disconnected");
            } else {
                global_metrics().protocol_error();
                warn!(error = %e, "Protocol error, disconnecting");
                let notice = notice_of_disconnection(ResultCode::ProtocolError, &e.to_string());
                let _ = self.writer.send_raw(notice.to_bytes()).await;
            }
        }
        self.close().await;
        info!("Connection closed");
        result.or_else(|e| if e.is_disconnect() { Ok(()) } else { Err(e) })
    }

    async fn close(&mut self) {
        if let Some(bind) = self.bind.take() {
            bind.token.cancel();
            debug!("Interrupted pending bind");
        }
        let interrupted = self.in_flight.cancel_all();
        if interrupted > 0 {
            debug!(interrupted, "Interrupted outstanding operations");
        }
        self.writer.shutdown().await;
    }

    /// Next queued request, once no bind is pending
    fn next_deferred(&mut self) -> Option<LdapMessage> {
        if self.bind.is_some() {
            return None;
        }
        self.deferred.pop_front()
    }

    fn session(&self) -> Session {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn dispatch(&mut self, message: LdapMessage) -> Result<Flow> {
        let tag = message.op_tag();
        if self.bind.is_some() && !matches!(tag, tags::UNBIND_REQUEST | tags::ABANDON_REQUEST) {
            debug!(message_id = message.message_id, tag, "Bind in progress, request queued");
            self.deferred.push_back(message);
            return Ok(Flow::Continue);
        }

        debug!(message_id = message.message_id, tag, "Dispatching request");
        match tag {
            tags::BIND_REQUEST => {
                self.spawn_bind(message)?;
                Ok(Flow::Continue)
            }
            tags::UNBIND_REQUEST => {
                debug!("Unbind received");
                Ok(Flow::Close)
            }
            tags::ABANDON_REQUEST => {
                let target = decode_abandon(&message.op)?;
                if self.in_flight.cancel(target) {
                    global_metrics().operation_abandoned();
                    debug!(target, "Abandoned request");
                }
                Ok(Flow::Continue)
            }
            tags::EXTENDED_REQUEST => self.extended(message).await,
            tags::SEARCH_REQUEST
            | tags::MODIFY_REQUEST
            | tags::ADD_REQUEST
            | tags::DEL_REQUEST
            | tags::MODIFY_DN_REQUEST
            | tags::COMPARE_REQUEST => {
                self.spawn_operation(message);
                Ok(Flow::Continue)
            }
            other => Err(ProtocolError::UnsupportedOperation(other)),
        }
    }

    fn spawn_operation(&self, message: LdapMessage) {
        let message_id = message.message_id;
        let (seq, token) = self.in_flight.register(message_id, &self.shutdown);
        let operation = Operation {
            ctx: Arc::clone(&self.ctx),
            writer: self.writer.clone(),
            message,
            session: self.session(),
            peer: self.peer.clone(),
            token,
        };
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            operation.run().await;
            in_flight.finish(message_id, seq);
        });
    }

    /// Interrupt outstanding requests and start the bind.
    ///
    /// A bad authentication choice fails the connection before any task runs.
    fn spawn_bind(&mut self, message: LdapMessage) -> Result<()> {
        let interrupted = self.in_flight.cancel_all();
        if interrupted > 0 {
            debug!(interrupted, "Bind interrupted outstanding operations");
        }

        let request = BindRequest::decode(&message.op)?;
        let token = self.shutdown.child_token();
        let bind = BindOperation {
            ctx: Arc::clone(&self.ctx),
            writer: self.writer.clone(),
            session: Arc::clone(&self.session),
            message_id: message.message_id,
            request,
            controls: message.controls,
            peer: self.peer.clone(),
            token: token.clone(),
        };
        self.bind = Some(PendingBind {
            task: tokio::spawn(bind.run()),
            token,
        });
        Ok(())
    }

    async fn extended(&mut self, message: LdapMessage) -> Result<Flow> {
        let id = message.message_id;
        let request = match ExtendedRequest::decode(&message.op) {
            Ok(request) => request,
            Err(e) => {
                self.writer
                    .send(id, extended_response(&LdapResponse::from(&e), None, None))
                    .await?;
                return Ok(Flow::Continue);
            }
        };

        match request.name.as_str() {
            oids::START_TLS => {
                if let Some(refusal) = self.start_tls_refusal() {
                    info!(reason = %refusal.message, "StartTLS refused");
                    let response = LdapResponse::from(&refusal);
                    self.writer
                        .send(id, extended_response(&response, Some(oids::START_TLS), None))
                        .await?;
                    return Ok(Flow::Continue);
                }
                self.writer
                    .send(
                        id,
                        extended_response(&LdapResponse::success(), Some(oids::START_TLS), None),
                    )
                    .await?;
                Ok(Flow::StartTls)
            }
            oids::WHO_AM_I => {
                let authz = self
                    .session()
                    .bound_dn
                    .as_ref()
                    .map(|dn| format!("dn:{dn}"))
                    .unwrap_or_default();
                self.writer
                    .send(
                        id,
                        extended_response(&LdapResponse::success(), None, Some(authz.as_bytes())),
                    )
                    .await?;
                Ok(Flow::Continue)
            }
            other => {
                let err = LdapError::protocol_error(format!("Unsupported extended operation {other}"));
                self.writer
                    .send(id, extended_response(&LdapResponse::from(&err), None, None))
                    .await?;
                Ok(Flow::Continue)
            }
        }
    }

    fn start_tls_refusal(&self) -> Option<LdapError> {
        if self.ctx.tls_acceptor.is_none() {
            Some(LdapError::unavailable(constants::ERR_TLS_NOT_CONFIGURED))
        } else if self.tls_active {
            Some(LdapError::operations_error(constants::ERR_TLS_ACTIVE))
        } else if self.in_flight.len() > 0 {
            Some(LdapError::operations_error(constants::ERR_TLS_OUTSTANDING))
        } else {
            None
        }
    }

    /// Run the TLS handshake over the raw stream and rebuild the reader
    async fn upgrade(&mut self, reader: Reader) -> Result<Reader> {
        if !reader.read_buffer().is_empty() {
            return Err(ProtocolError::TlsError(constants::ERR_TLS_BUFFERED.into()));
        }
        let acceptor = self
            .ctx
            .tls_acceptor
            .clone()
            .ok_or_else(|| ProtocolError::TlsError(constants::ERR_TLS_NOT_CONFIGURED.into()))?;
        let write_half = self
            .writer
            .take()
            .await
            .ok_or_else(|| ProtocolError::TransportError(constants::ERR_WRITER_GONE.into()))?;
        let stream = reader.into_inner().unsplit(write_half);

        let tls = with_timeout_error(
            async { acceptor.accept(stream).await.map_err(ProtocolError::from) },
            self.ctx.handshake_timeout,
        )
        .await?;
        global_metrics().tls_handshake(true);
        info!("StartTLS handshake complete");

        let boxed: BoxedStream = Box::new(tls);
        let (read_half, write_half) = tokio::io::split(boxed);
        self.writer.install(write_half).await;
        self.tls_active = true;
        Ok(FramedRead::new(read_half, LdapCodec::new(self.ctx.max_message_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_cancel() {
        let parent = CancellationToken::new();
        let in_flight = InFlight::default();
        let (_, token) = in_flight.register(7, &parent);
        assert_eq!(in_flight.len(), 1);

        assert!(in_flight.cancel(7));
        assert!(token.is_cancelled());
        assert!(!in_flight.cancel(7));
        assert_eq!(in_flight.len(), 0);
    }

    #[test]
    fn test_in_flight_finish_ignores_stale_registration() {
        let parent = CancellationToken::new();
        let in_flight = InFlight::default();
        let (old, _) = in_flight.register(3, &parent);
        let (_, current) = in_flight.register(3, &parent);

        in_flight.finish(3, old);
        assert_eq!(in_flight.len(), 1);
        assert!(in_flight.cancel(3));
        assert!(current.is_cancelled());
    }

    #[test]
    fn test_in_flight_cancel_all() {
        let parent = CancellationToken::new();
        let in_flight = InFlight::default();
        let tokens: Vec<_> = (1..=3).map(|id| in_flight.register(id, &parent).1).collect();

        assert_eq!(in_flight.cancel_all(), 3);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
        assert_eq!(in_flight.len(), 0);
    }

    #[test]
    fn test_parent_cancellation_reaches_requests() {
        let parent = CancellationToken::new();
        let in_flight = InFlight::default();
        let (_, token) = in_flight.register(1, &parent);
        parent.cancel();
        assert!(token.is_cancelled());
    }
}
