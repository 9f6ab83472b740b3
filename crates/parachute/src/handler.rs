//! # Handlers
//!
//! The request and response envelopes, the server side of a stream, and the
//! type-erased handler functions the router stores.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use futures::FutureExt;

use parachute_wire::Code;
use parachute_wire::Error;
use parachute_wire::Frame;
use parachute_wire::Headers;
use parachute_wire::Result;
use parachute_wire::StreamId;

use crate::context::Context;
use crate::transport::Transport;

/// An inbound request: headers plus the single request message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { headers: Headers::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// A unary response message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }
}

/// Where a streaming call is in its lifecycle.
///
/// `Open -> Sending* -> (Completed | FaultedRecovered | FaultedPropagated)`.
/// Only the first terminal transition sticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallState {
    Open = 0,
    Sending = 1,
    Completed = 2,
    FaultedRecovered = 3,
    FaultedPropagated = 4,
}

impl CallState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Sending,
            2 => Self::Completed,
            3 => Self::FaultedRecovered,
            4 => Self::FaultedPropagated,
            // Only `CallState as u8` is ever stored in the phase byte.
            other => unreachable!("invalid call state {}", other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FaultedRecovered | Self::FaultedPropagated)
    }
}

#[derive(Debug)]
struct StreamStateInner {
    sent: AtomicU64,
    phase: AtomicU8,
}

/// Bookkeeping for one streaming call, shared by the handler's `ServerStream`
/// and the invoker's panic guard.
#[derive(Clone, Debug)]
pub struct StreamState {
    inner: Arc<StreamStateInner>,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StreamStateInner {
                sent: AtomicU64::new(0),
                phase: AtomicU8::new(CallState::Open as u8),
            }),
        }
    }

    /// Messages already handed to the transport. They are never rolled back.
    pub fn messages_sent(&self) -> u64 {
        self.inner.sent.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CallState {
        CallState::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    fn record_send(&self) {
        self.inner.sent.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.phase.compare_exchange(
            CallState::Open as u8,
            CallState::Sending as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Moves the call into a terminal state.
    ///
    /// Returns `false` if the call had already terminated.
    pub(crate) fn finish(&self, terminal: CallState) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.inner.phase.load(Ordering::Acquire);
        loop {
            if CallState::from_u8(current).is_terminal() {
                return false;
            }
            match self.inner.phase.compare_exchange(
                current,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// The server side of a streaming call.
pub struct ServerStream {
    stream: StreamId,
    transport: Arc<dyn Transport>,
    state: StreamState,
}

impl ServerStream {
    pub fn new(stream: StreamId, transport: Arc<dyn Transport>) -> Self {
        Self { stream, transport, state: StreamState::new() }
    }

    /// Sends one response message.
    ///
    /// Waits until the transport has accepted the message.
    pub async fn send(&mut self, body: impl Into<Vec<u8>>) -> Result<()> {
        if self.state.state().is_terminal() {
            return Err(Error::new(Code::Internal, "send on a finished stream"));
        }
        let frame = Frame::Message { stream: self.stream, body: body.into() };
        self.transport
            .send(frame)
            .await
            .map_err(|e| Error::new(Code::Unavailable, e))?;
        self.state.record_send();
        Ok(())
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream
    }

    pub fn messages_sent(&self) -> u64 {
        self.state.messages_sent()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }
}

pub(crate) type UnaryFn =
    Arc<dyn Fn(Context, Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

pub(crate) type StreamFn =
    Arc<dyn Fn(Context, Request, ServerStream) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub(crate) fn unary_fn<F, Fut>(handler: F) -> UnaryFn
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |ctx, request| handler(ctx, request).boxed())
}

pub(crate) fn stream_fn<F, Fut>(handler: F) -> StreamFn
where
    F: Fn(Context, Request, ServerStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, request, stream| handler(ctx, request, stream).boxed())
}
