//! # Server
//!
//! Routes inbound calls to handlers and acts as the transport boundary.
//!
//! Every call runs on its own task. A supervising task joins it and writes
//! the stream's single terminal frame: the `End` the call produced, or, when
//! the call task unwound (a sentinel, or a panic outside the guard), a
//! `Reset` with `INTERNAL_ERROR`. Clients map that reset to `internal`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::task::JoinError;
use tokio::task::JoinHandle;

use parachute_wire::Code;
use parachute_wire::Error as RpcError;
use parachute_wire::Frame;
use parachute_wire::Reason;
use parachute_wire::Result as RpcResult;
use parachute_wire::Spec;
use parachute_wire::Status;
use parachute_wire::StreamId;
use parachute_wire::StreamType;

use crate::client::Client;
use crate::config::Config;
use crate::config::ConfigBuilder;
use crate::context::CancelHandle;
use crate::context::ConnectionId;
use crate::context::Context;
use crate::handler::Request;
use crate::handler::Response;
use crate::handler::ServerStream;
use crate::handler::StreamFn;
use crate::handler::UnaryFn;
use crate::handler::stream_fn;
use crate::handler::unary_fn;
use crate::invoke::invoke_server_stream;
use crate::invoke::invoke_unary;
use crate::memory::MemoryTransport;
use crate::recover::RecoverPolicy;
use crate::recover::describe;
use crate::transport::Transport;

/// Failures while assembling a server.
#[derive(Debug, Clone)]
pub enum Error {
    /// Two handlers were registered under the same procedure.
    DuplicateProcedure(String),
    /// Procedure names must look like `/package.Service/Method`.
    InvalidProcedure(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateProcedure(name) => write!(f, "Procedure registered twice: {}", name),
            Self::InvalidProcedure(name) => write!(f, "Invalid procedure name: {}", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
enum Handler {
    Unary(UnaryFn),
    ServerStream(StreamFn),
}

struct Route {
    spec: Spec,
    handler: Handler,
}

struct ServerInner {
    config: Config,
    routes: HashMap<String, Route>,
    next_connection: AtomicU64,
}

/// A set of routed procedures sharing one configuration.
///
/// Clones share the same routes, configuration and connection numbering.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

type ActiveCalls = Arc<DashMap<StreamId, CancelHandle>>;

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Serves one connection until the peer goes away.
    pub fn serve(&self, transport: Arc<dyn Transport>) -> JoinHandle<()> {
        let connection = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::Relaxed));
        let server = self.clone();
        tokio::spawn(async move { server.run_connection(connection, transport).await })
    }

    /// Opens a fresh in-memory connection to this server.
    pub fn connect(&self) -> Client {
        let (client_side, server_side) = MemoryTransport::pair(self.inner.config.stream_buffer());
        self.serve(Arc::new(server_side));
        Client::new(Arc::new(client_side))
    }

    async fn run_connection(self, connection: ConnectionId, transport: Arc<dyn Transport>) {
        tracing::debug!(%connection, "connection opened");
        let active: ActiveCalls = Arc::new(DashMap::new());

        loop {
            match transport.recv().await {
                Ok(Some(Frame::Call { stream, procedure, stream_type, headers, body })) => {
                    let request = Request { headers, body };
                    self.dispatch(connection, stream, &procedure, stream_type, request, &transport, &active);
                }
                Ok(Some(Frame::Reset { stream, reason })) => {
                    tracing::debug!(%connection, %stream, %reason, "stream reset by client");
                    if let Some(cancel) = active.get(&stream) {
                        cancel.cancel();
                    }
                }
                Ok(Some(frame)) => {
                    tracing::warn!(%connection, stream = %frame.stream(), "unexpected frame from client, ignoring");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "transport error, closing connection");
                    break;
                }
            }
        }

        // Calls still running can no longer be answered.
        for entry in active.iter() {
            entry.value().cancel();
        }
        tracing::debug!(%connection, "connection closed");
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        connection: ConnectionId,
        stream: StreamId,
        procedure: &str,
        stream_type: StreamType,
        request: Request,
        transport: &Arc<dyn Transport>,
        active: &ActiveCalls,
    ) {
        let transport = Arc::clone(transport);

        if active.contains_key(&stream) {
            tracing::warn!(%connection, %stream, "call on a stream that is still open, resetting");
            refuse(transport, stream, Frame::Reset { stream, reason: Reason::PROTOCOL_ERROR });
            return;
        }

        let route = match self.inner.routes.get(procedure) {
            Some(route) if route.spec.stream_type == stream_type => route,
            Some(route) => {
                let message = format!(
                    "{} is a {} procedure, called as {}",
                    procedure, route.spec.stream_type, stream_type
                );
                reject(transport, stream, Status::new(Code::Unimplemented, message));
                return;
            }
            None => {
                let message = format!("{} is not implemented", procedure);
                reject(transport, stream, Status::new(Code::Unimplemented, message));
                return;
            }
        };

        let (ctx, cancel) = Context::new(connection, stream);
        active.insert(stream, cancel);

        let config = self.inner.config.clone();
        let spec = route.spec.clone();
        let handler = route.handler.clone();
        let active = Arc::clone(active);

        tokio::spawn(async move {
            let call = tokio::spawn(run_call(
                config.clone(),
                ctx,
                spec.clone(),
                request,
                handler,
                Arc::clone(&transport),
            ));

            let terminal = match call.await {
                Ok(status) => Frame::End { stream, status },
                Err(join) => reset_after_escape(&config, &spec, stream, join),
            };

            active.remove(&stream);
            if let Err(e) = transport.send(terminal).await {
                tracing::debug!(procedure = %spec.procedure, %stream, error = %e, "could not finish stream");
            }
        });
    }
}

fn reject(transport: Arc<dyn Transport>, stream: StreamId, status: Status) {
    tracing::debug!(%stream, message = %status.message, "rejecting call");
    refuse(transport, stream, Frame::End { stream, status: Some(status) });
}

/// Answers a call that never reaches a handler with a single terminal frame.
fn refuse(transport: Arc<dyn Transport>, stream: StreamId, terminal: Frame) {
    tokio::spawn(async move {
        if let Err(e) = transport.send(terminal).await {
            tracing::debug!(%stream, error = %e, "could not refuse call");
        }
    });
}

/// Runs one call to completion and returns the status its `End` frame carries.
async fn run_call(
    config: Config,
    ctx: Context,
    spec: Spec,
    request: Request,
    handler: Handler,
    transport: Arc<dyn Transport>,
) -> Option<Status> {
    let stream = ctx.stream();
    tracing::debug!(procedure = %spec.procedure, %stream, "call started");

    let result: RpcResult<()> = match handler {
        Handler::Unary(handler) => {
            let outcome = invoke_unary(&config, ctx, &spec, request, |ctx, request| handler(ctx, request)).await;
            match outcome {
                Ok(response) => send_response(&*transport, stream, response).await,
                Err(e) => Err(e),
            }
        }
        Handler::ServerStream(handler) => {
            let server_stream = ServerStream::new(stream, Arc::clone(&transport));
            invoke_server_stream(&config, ctx, &spec, request, server_stream, |ctx, request, stream| {
                handler(ctx, request, stream)
            })
            .await
        }
    };

    match result {
        Ok(()) => {
            tracing::debug!(procedure = %spec.procedure, %stream, "call finished");
            None
        }
        Err(e) => {
            tracing::debug!(procedure = %spec.procedure, %stream, code = %e.code(), "call failed");
            Some(e.to_status())
        }
    }
}

async fn send_response(transport: &dyn Transport, stream: StreamId, response: Response) -> RpcResult<()> {
    transport
        .send(Frame::Message { stream, body: response.body })
        .await
        .map_err(|e| RpcError::new(Code::Unavailable, e))
}

/// The boundary's answer to a call task that did not return.
fn reset_after_escape(config: &Config, spec: &Spec, stream: StreamId, join: JoinError) -> Frame {
    if join.is_panic() {
        let payload = join.into_panic();
        if config.sentinels().must_propagate(&*payload) {
            tracing::debug!(procedure = %spec.procedure, %stream, "handler aborted, resetting stream");
        } else {
            tracing::error!(
                procedure = %spec.procedure,
                %stream,
                panic = %describe(&*payload),
                "panic escaped the recovery guard, resetting stream"
            );
        }
    } else {
        tracing::warn!(procedure = %spec.procedure, %stream, "call task cancelled, resetting stream");
    }
    Frame::Reset { stream, reason: Reason::INTERNAL_ERROR }
}

/// Fluent builder for `Server`.
pub struct ServerBuilder {
    config: ConfigBuilder,
    routes: Vec<(String, Handler, StreamType)>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigBuilder::new(),
            routes: Vec::new(),
        }
    }

    /// Sets the recovery policy applied to handler panics.
    pub fn recover(mut self, policy: impl RecoverPolicy) -> Self {
        self.config = self.config.recover(policy);
        self
    }

    pub fn sentinel<T: std::any::Any + Send>(mut self) -> Self {
        self.config = self.config.sentinel::<T>();
        self
    }

    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.config = self.config.stream_buffer(frames);
        self
    }

    pub fn unary<F, Fut>(mut self, procedure: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Response>> + Send + 'static,
    {
        self.routes.push((procedure.into(), Handler::Unary(unary_fn(handler)), StreamType::Unary));
        self
    }

    pub fn server_stream<F, Fut>(mut self, procedure: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context, Request, ServerStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<()>> + Send + 'static,
    {
        self.routes.push((
            procedure.into(),
            Handler::ServerStream(stream_fn(handler)),
            StreamType::ServerStream,
        ));
        self
    }

    pub fn build(self) -> Result<Server> {
        let mut routes = HashMap::with_capacity(self.routes.len());
        for (procedure, handler, stream_type) in self.routes {
            if !is_valid_procedure(&procedure) {
                return Err(Error::InvalidProcedure(procedure));
            }
            if routes.contains_key(&procedure) {
                return Err(Error::DuplicateProcedure(procedure));
            }
            let spec = Spec::server(procedure.clone(), stream_type);
            routes.insert(procedure, Route { spec, handler });
        }

        Ok(Server {
            inner: Arc::new(ServerInner {
                config: self.config.build(),
                routes,
                next_connection: AtomicU64::new(1),
            }),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_procedure(procedure: &str) -> bool {
    let Some(rest) = procedure.strip_prefix('/') else { return false };
    match rest.split_once('/') {
        Some((service, method)) => !service.is_empty() && !method.is_empty() && !method.contains('/'),
        None => false,
    }
}
