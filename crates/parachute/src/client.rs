//! # RPC Client
//!
//! The calling side of a connection. A background pump task reads frames from
//! the transport and routes them to the stream they belong to, so any number
//! of calls can be in flight on one connection.
//!
//! What the client reports follows the transport boundary contract: an `End`
//! frame yields the server's status, a `Reset` yields the code its reason
//! maps to (`INTERNAL_ERROR` is `internal`).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parachute_wire::Code;
use parachute_wire::Error;
use parachute_wire::Frame;
use parachute_wire::Reason;
use parachute_wire::Result;
use parachute_wire::StreamId;
use parachute_wire::StreamType;

use crate::handler::Request;
use crate::handler::Response;
use crate::transport::Transport;

type Inbound = Result<Frame>;
type Streams = DashMap<StreamId, mpsc::UnboundedSender<Inbound>>;

struct ClientInner {
    transport: Arc<dyn Transport>,
    streams: Arc<Streams>,
    closed: Arc<AtomicBool>,
    next_stream: AtomicU64,
    pump: JoinHandle<()>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// RPC client over one connection.
///
/// Clones share the connection. The pump stops when the last clone and the
/// last open stream are gone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Wraps a connected transport and spawns the pump task.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let streams: Arc<Streams> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let pump = tokio::spawn(pump(Arc::clone(&transport), Arc::clone(&streams), Arc::clone(&closed)));

        Self {
            inner: Arc::new(ClientInner {
                transport,
                streams,
                closed,
                next_stream: AtomicU64::new(1),
                pump,
            }),
        }
    }

    /// Calls a unary procedure.
    pub async fn unary(&self, procedure: &str, request: Request) -> Result<Response> {
        let mut call = self.open(procedure, StreamType::Unary, request).await?;
        let mut body = None;

        loop {
            match call.next().await? {
                Frame::Message { body: message, .. } => {
                    if body.is_some() {
                        return Err(protocol_error("unary response has more than one message"));
                    }
                    body = Some(message);
                }
                Frame::End { status: Some(status), .. } => return Err(status.into()),
                Frame::End { status: None, .. } => {
                    return body
                        .map(Response::new)
                        .ok_or_else(|| protocol_error("unary response has no message"));
                }
                Frame::Reset { reason, .. } => return Err(reset_error(reason)),
                Frame::Call { .. } => return Err(protocol_error("server sent a call frame")),
            }
        }
    }

    /// Calls a server-streaming procedure.
    ///
    /// Succeeds as soon as the call is sent. How the stream ends is reported
    /// by `ServerStreamForClient::err` once `receive` returns `false`.
    pub async fn server_stream(&self, procedure: &str, request: Request) -> Result<ServerStreamForClient> {
        let call = self.open(procedure, StreamType::ServerStream, request).await?;
        Ok(ServerStreamForClient { call, msg: None, err: None, done: false })
    }

    async fn open(&self, procedure: &str, stream_type: StreamType, request: Request) -> Result<OpenCall> {
        let stream = StreamId(self.inner.next_stream.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.streams.insert(stream, tx);

        let mut call = OpenCall { stream, rx, client: Arc::clone(&self.inner), finished: false };

        // Checked after registering so the pump's final sweep cannot miss us.
        if self.inner.closed.load(Ordering::SeqCst) {
            call.finished = true;
            return Err(connection_closed());
        }

        let frame = Frame::Call {
            stream,
            procedure: procedure.to_string(),
            stream_type,
            headers: request.headers,
            body: request.body,
        };
        if let Err(e) = self.inner.transport.send(frame).await {
            call.finished = true;
            return Err(Error::new(Code::Unavailable, e));
        }

        Ok(call)
    }
}

/// Reads the connection and routes every frame to its stream.
async fn pump(transport: Arc<dyn Transport>, streams: Arc<Streams>, closed: Arc<AtomicBool>) {
    let reason = loop {
        match transport.recv().await {
            Ok(Some(frame)) => {
                let stream = frame.stream();
                let terminal = frame.is_terminal();
                match streams.get(&stream) {
                    Some(tx) => {
                        let _ = tx.send(Ok(frame));
                    }
                    None => {
                        // Closed locally or never opened; late frames are dropped.
                        tracing::trace!(%stream, "frame for unknown stream");
                        continue;
                    }
                }
                if terminal {
                    streams.remove(&stream);
                }
            }
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "transport error in client pump");
                break e.to_string();
            }
        }
    };

    closed.store(true, Ordering::SeqCst);
    notify_all_pending(&streams, &reason);
}

fn notify_all_pending(streams: &Streams, reason: &str) {
    let keys: Vec<StreamId> = streams.iter().map(|entry| *entry.key()).collect();
    for key in keys {
        if let Some((_, tx)) = streams.remove(&key) {
            let _ = tx.send(Err(Error::new(Code::Unavailable, reason.to_string())));
        }
    }
}

fn reset_error(reason: Reason) -> Error {
    Error::new(reason.to_code(), format!("stream reset by server: {}", reason))
}

fn protocol_error(message: &str) -> Error {
    Error::new(Code::Internal, format!("protocol error: {}", message))
}

fn connection_closed() -> Error {
    Error::new(Code::Unavailable, "connection closed")
}

/// One registered stream on the client side.
///
/// Holds the connection open: the pump outlives every `OpenCall`. Dropping
/// a call the server has not finished cancels it.
struct OpenCall {
    stream: StreamId,
    rx: mpsc::UnboundedReceiver<Inbound>,
    client: Arc<ClientInner>,
    finished: bool,
}

impl OpenCall {
    async fn next(&mut self) -> Result<Frame> {
        let inbound = match self.rx.recv().await {
            Some(inbound) => inbound,
            None => Err(connection_closed()),
        };
        match &inbound {
            Ok(frame) if !frame.is_terminal() => {}
            _ => self.finished = true,
        }
        inbound
    }

    /// Asks the server to cancel the stream, unless it has already ended.
    async fn cancel(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.client.streams.remove(&self.stream);
        send_cancel(&*self.client.transport, self.stream).await;
    }
}

impl Drop for OpenCall {
    fn drop(&mut self) {
        self.client.streams.remove(&self.stream);
        if self.finished || self.client.closed.load(Ordering::SeqCst) {
            return;
        }
        // Drop cannot await, so the reset goes out on its own task.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = Arc::clone(&self.client.transport);
        let stream = self.stream;
        runtime.spawn(async move { send_cancel(&*transport, stream).await });
    }
}

async fn send_cancel(transport: &dyn Transport, stream: StreamId) {
    let frame = Frame::Reset { stream, reason: Reason::CANCEL };
    if let Err(e) = transport.send(frame).await {
        tracing::debug!(%stream, error = %e, "could not cancel stream");
    }
}

/// The client side of a server-streaming call.
pub struct ServerStreamForClient {
    call: OpenCall,
    msg: Option<Vec<u8>>,
    err: Option<Error>,
    done: bool,
}

impl ServerStreamForClient {
    /// Advances to the next message.
    ///
    /// Returns `true` when a message is available through `msg()`, `false`
    /// once the stream has ended. After `false`, `err()` tells how it ended.
    pub async fn receive(&mut self) -> bool {
        if self.done {
            return false;
        }

        let ended = match self.call.next().await {
            Ok(Frame::Message { body, .. }) => {
                self.msg = Some(body);
                return true;
            }
            Ok(Frame::End { status, .. }) => status.map(Error::from),
            Ok(Frame::Reset { reason, .. }) => Some(reset_error(reason)),
            Ok(Frame::Call { .. }) => Some(protocol_error("server sent a call frame")),
            Err(e) => Some(e),
        };

        self.msg = None;
        self.err = ended;
        self.done = true;
        false
    }

    /// The message most recently received.
    pub fn msg(&self) -> Option<&[u8]> {
        self.msg.as_deref()
    }

    pub fn take_msg(&mut self) -> Option<Vec<u8>> {
        self.msg.take()
    }

    /// The error that ended the stream, or `None` while it is open or if it
    /// ended successfully.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub fn into_err(self) -> Option<Error> {
        self.err
    }

    pub fn stream_id(&self) -> StreamId {
        self.call.stream
    }

    /// Stops the stream. If it is still open the server is told to cancel it.
    pub async fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.msg = None;
        self.call.cancel().await;
    }
}
