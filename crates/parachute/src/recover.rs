//! # Recovery Policy
//!
//! What a handler panic turns into is the integrator's decision. A
//! `RecoverPolicy` receives the call's context, its `Spec`, the request
//! headers and the recovered payload, and answers with the error the client
//! should see.

use std::any::Any;
use std::fmt;

use parachute_wire::BoxError;
use parachute_wire::Code;
use parachute_wire::Error;
use parachute_wire::Headers;
use parachute_wire::Spec;

use crate::context::Context;

/// The payload of a caught panic.
///
/// `Empty` stands for a panic raised with `()` (e.g. `panic_any(())`). It is a
/// real panic like any other and is routed through the policy.
pub enum Recovered {
    Empty,
    Payload(Box<dyn Any + Send>),
}

impl Recovered {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        if payload.is::<()>() {
            Self::Empty
        } else {
            Self::Payload(payload)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Payload(payload) => payload.downcast_ref::<T>(),
        }
    }

    /// The panic message, if the payload is a `&str` or a `String`.
    ///
    /// This covers every `panic!` invocation with a format string.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Payload(payload) => message_of(&**payload),
        }
    }

    /// Gives the payload back, e.g. to `resume_unwind` it.
    pub fn into_payload(self) -> Box<dyn Any + Send> {
        match self {
            Self::Empty => Box::new(()),
            Self::Payload(payload) => payload,
        }
    }
}

impl fmt::Display for Recovered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("<empty>"),
            Self::Payload(payload) => f.write_str(&describe(&**payload)),
        }
    }
}

impl fmt::Debug for Recovered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Recovered::Empty"),
            Self::Payload(_) => write!(f, "Recovered::Payload({})", self),
        }
    }
}

fn message_of(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return Some(*msg);
    }
    payload.downcast_ref::<String>().map(String::as_str)
}

macro_rules! describe_scalars {
    ($payload:expr, $($ty:ty),*) => {
        $(
            if let Some(value) = $payload.downcast_ref::<$ty>() {
                return value.to_string();
            }
        )*
    };
}

/// Renders a panic payload for logs and default error messages.
pub(crate) fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = message_of(payload) {
        return msg.to_string();
    }
    if payload.is::<()>() {
        return "<empty>".to_string();
    }
    if let Some(sentinel) = payload.downcast_ref::<crate::sentinel::AbortHandler>() {
        return sentinel.to_string();
    }
    describe_scalars!(payload, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);
    "Box<dyn Any>".to_string()
}

/// Converts a recovered panic into the error the client receives.
///
/// Called at most once per panic, and never for sentinels. Returning `None`
/// asks for the default `internal` error. Returning an error that is not a
/// `parachute_wire::Error` makes the client see `unknown`.
pub trait RecoverPolicy: Send + Sync + 'static {
    fn recover(
        &self,
        ctx: &Context,
        spec: &Spec,
        headers: &Headers,
        recovered: &Recovered,
    ) -> Option<BoxError>;
}

impl<F> RecoverPolicy for F
where
    F: Fn(&Context, &Spec, &Headers, &Recovered) -> Option<BoxError> + Send + Sync + 'static,
{
    fn recover(
        &self,
        ctx: &Context,
        spec: &Spec,
        headers: &Headers,
        recovered: &Recovered,
    ) -> Option<BoxError> {
        self(ctx, spec, headers, recovered)
    }
}

/// The policy in force when none is configured: every panic becomes `internal`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultPolicy;

impl RecoverPolicy for DefaultPolicy {
    fn recover(
        &self,
        _ctx: &Context,
        spec: &Spec,
        _headers: &Headers,
        recovered: &Recovered,
    ) -> Option<BoxError> {
        let message = format!("{} panicked: {}", spec.procedure, recovered);
        Some(Error::new(Code::Internal, message).into())
    }
}

/// The error used when a policy declines to produce one.
pub(crate) fn fallback_error(recovered: &Recovered) -> Error {
    Error::new(Code::Internal, format!("recovered handler panic: {}", recovered))
}
