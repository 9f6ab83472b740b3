//! # Call Descriptors
//!
//! A `Spec` is created when a procedure is registered and handed, read-only,
//! to every call routed to it.

use std::fmt;

/// The shape of a call.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum StreamType {
    /// One request, one response.
    Unary,
    /// One request, zero or more responses.
    ServerStream,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary => f.write_str("unary"),
            Self::ServerStream => f.write_str("server-stream"),
        }
    }
}

/// Describes the procedure being invoked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spec {
    /// Fully qualified procedure name, e.g. `/ping.v1.PingService/Ping`.
    pub procedure: String,
    pub stream_type: StreamType,
    /// `true` on the calling side, `false` in a handler.
    pub is_client: bool,
}

impl Spec {
    pub fn server(procedure: impl Into<String>, stream_type: StreamType) -> Self {
        Self { procedure: procedure.into(), stream_type, is_client: false }
    }

    pub fn client(procedure: impl Into<String>, stream_type: StreamType) -> Self {
        Self { procedure: procedure.into(), stream_type, is_client: true }
    }
}
