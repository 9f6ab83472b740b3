//! # Call Invokers
//!
//! Each invoker runs one handler inside a panic guard. The guard is the
//! `catch_unwind` around the handler future: it observes normal returns,
//! returned errors and panics alike, and runs exactly once per call.
//!
//! A caught panic is classified first. Sentinels are re-raised untouched with
//! `resume_unwind`, so the call task unwinds into the transport boundary.
//! Everything else is handed to the recovery policy and comes back as the
//! call's error.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use parachute_wire::Error;
use parachute_wire::Headers;
use parachute_wire::Result;
use parachute_wire::Spec;

use crate::config::Config;
use crate::context::Context;
use crate::handler::CallState;
use crate::handler::Request;
use crate::handler::Response;
use crate::handler::ServerStream;
use crate::recover::Recovered;
use crate::recover::fallback_error;

enum Fault {
    Propagate(Box<dyn Any + Send>),
    Recover(Recovered),
}

fn classify(config: &Config, payload: Box<dyn Any + Send>) -> Fault {
    if config.sentinels().must_propagate(&*payload) {
        Fault::Propagate(payload)
    } else {
        Fault::Recover(Recovered::from_payload(payload))
    }
}

fn apply_policy(
    config: &Config,
    ctx: &Context,
    spec: &Spec,
    headers: &Headers,
    recovered: &Recovered,
) -> Error {
    match config.policy().recover(ctx, spec, headers, recovered) {
        Some(err) => Error::from_boxed(err),
        None => fallback_error(recovered),
    }
}

/// Runs a unary handler under the panic guard.
///
/// The handler's own result passes through untouched. A recovered panic
/// yields the policy's error. A sentinel panic does not return at all.
pub async fn invoke_unary<F, Fut>(
    config: &Config,
    ctx: Context,
    spec: &Spec,
    request: Request,
    handler: F,
) -> Result<Response>
where
    F: FnOnce(Context, Request) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let headers = request.headers.clone();
    let handler_ctx = ctx.clone();

    // The call itself sits inside the future so a panic while building the
    // handler future is caught too.
    let guarded = AssertUnwindSafe(async move { handler(handler_ctx, request).await })
        .catch_unwind()
        .await;

    let payload = match guarded {
        Ok(outcome) => return outcome,
        Err(payload) => payload,
    };

    match classify(config, payload) {
        Fault::Propagate(payload) => {
            tracing::debug!(
                procedure = %spec.procedure,
                stream = %ctx.stream(),
                "sentinel panic, propagating to transport"
            );
            std::panic::resume_unwind(payload)
        }
        Fault::Recover(recovered) => {
            tracing::warn!(
                procedure = %spec.procedure,
                stream = %ctx.stream(),
                panic = %recovered,
                "recovered panic in unary handler"
            );
            Err(apply_policy(config, &ctx, spec, &headers, &recovered))
        }
    }
}

/// Runs a server-streaming handler under the panic guard.
///
/// Messages the handler sent before panicking stay sent. A recovered panic
/// becomes the error that ends the stream after them. A sentinel panic
/// leaves the stream without any ending, for the transport to reset.
pub async fn invoke_server_stream<F, Fut>(
    config: &Config,
    ctx: Context,
    spec: &Spec,
    request: Request,
    stream: ServerStream,
    handler: F,
) -> Result<()>
where
    F: FnOnce(Context, Request, ServerStream) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let headers = request.headers.clone();
    let state = stream.state().clone();
    let handler_ctx = ctx.clone();

    let guarded = AssertUnwindSafe(async move { handler(handler_ctx, request, stream).await })
        .catch_unwind()
        .await;

    let payload = match guarded {
        Ok(outcome) => {
            state.finish(CallState::Completed);
            return outcome;
        }
        Err(payload) => payload,
    };

    match classify(config, payload) {
        Fault::Propagate(payload) => {
            state.finish(CallState::FaultedPropagated);
            tracing::debug!(
                procedure = %spec.procedure,
                stream = %ctx.stream(),
                sent = state.messages_sent(),
                "sentinel panic, propagating to transport"
            );
            std::panic::resume_unwind(payload)
        }
        Fault::Recover(recovered) => {
            state.finish(CallState::FaultedRecovered);
            tracing::warn!(
                procedure = %spec.procedure,
                stream = %ctx.stream(),
                sent = state.messages_sent(),
                panic = %recovered,
                "recovered panic in streaming handler"
            );
            Err(apply_policy(config, &ctx, spec, &headers, &recovered))
        }
    }
}
