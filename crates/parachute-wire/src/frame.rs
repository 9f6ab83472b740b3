//! # Protocol Frames
//!
//! The units exchanged on a connection. Every frame names the stream it
//! belongs to, so any number of calls can share one connection.
//!
//! ## Invariants
//! - A client opens a stream with exactly one `Call`.
//! - A server closes a stream with exactly one of `End` or `Reset`.
//! - `Message` frames only ever precede the terminal frame.

use std::fmt;

use crate::code::Code;
use crate::error::Status;
use crate::headers::Headers;
use crate::spec::StreamType;

/// Identifies one call on a connection.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// A frame on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Client to server: open a stream with request headers and the single
    /// request message.
    Call {
        stream: StreamId,
        procedure: String,
        stream_type: StreamType,
        headers: Headers,
        body: Vec<u8>,
    },
    /// Server to client: one response message.
    Message { stream: StreamId, body: Vec<u8> },
    /// Server to client: graceful end of stream. `None` means success.
    End { stream: StreamId, status: Option<Status> },
    /// Either direction: abrupt termination without a well-formed response.
    Reset { stream: StreamId, reason: Reason },
}

impl Frame {
    pub fn stream(&self) -> StreamId {
        match self {
            Self::Call { stream, .. }
            | Self::Message { stream, .. }
            | Self::End { stream, .. }
            | Self::Reset { stream, .. } => *stream,
        }
    }

    /// Whether this frame closes its stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End { .. } | Self::Reset { .. })
    }
}

/// An HTTP/2 stream error code, as carried by `RST_STREAM`.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct Reason(pub u32);

impl Reason {
    pub const NO_ERROR: Reason = Reason(0x0);
    pub const PROTOCOL_ERROR: Reason = Reason(0x1);
    pub const INTERNAL_ERROR: Reason = Reason(0x2);
    pub const FLOW_CONTROL_ERROR: Reason = Reason(0x3);
    pub const SETTINGS_TIMEOUT: Reason = Reason(0x4);
    pub const STREAM_CLOSED: Reason = Reason(0x5);
    pub const FRAME_SIZE_ERROR: Reason = Reason(0x6);
    pub const REFUSED_STREAM: Reason = Reason(0x7);
    pub const CANCEL: Reason = Reason(0x8);
    pub const COMPRESSION_ERROR: Reason = Reason(0x9);
    pub const CONNECT_ERROR: Reason = Reason(0xa);
    pub const ENHANCE_YOUR_CALM: Reason = Reason(0xb);
    pub const INADEQUATE_SECURITY: Reason = Reason(0xc);
    pub const HTTP_1_1_REQUIRED: Reason = Reason(0xd);

    /// The code a client reports when its stream is reset with this reason.
    pub fn to_code(self) -> Code {
        match self {
            Self::NO_ERROR
            | Self::PROTOCOL_ERROR
            | Self::INTERNAL_ERROR
            | Self::FLOW_CONTROL_ERROR
            | Self::SETTINGS_TIMEOUT
            | Self::FRAME_SIZE_ERROR
            | Self::COMPRESSION_ERROR
            | Self::CONNECT_ERROR => Code::Internal,
            Self::REFUSED_STREAM => Code::Unavailable,
            Self::CANCEL => Code::Canceled,
            Self::ENHANCE_YOUR_CALM => Code::ResourceExhausted,
            Self::INADEQUATE_SECURITY => Code::PermissionDenied,
            _ => Code::Unknown,
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::NO_ERROR => "NO_ERROR",
            Self::PROTOCOL_ERROR => "PROTOCOL_ERROR",
            Self::INTERNAL_ERROR => "INTERNAL_ERROR",
            Self::FLOW_CONTROL_ERROR => "FLOW_CONTROL_ERROR",
            Self::SETTINGS_TIMEOUT => "SETTINGS_TIMEOUT",
            Self::STREAM_CLOSED => "STREAM_CLOSED",
            Self::FRAME_SIZE_ERROR => "FRAME_SIZE_ERROR",
            Self::REFUSED_STREAM => "REFUSED_STREAM",
            Self::CANCEL => "CANCEL",
            Self::COMPRESSION_ERROR => "COMPRESSION_ERROR",
            Self::CONNECT_ERROR => "CONNECT_ERROR",
            Self::ENHANCE_YOUR_CALM => "ENHANCE_YOUR_CALM",
            Self::INADEQUATE_SECURITY => "INADEQUATE_SECURITY",
            Self::HTTP_1_1_REQUIRED => "HTTP_1_1_REQUIRED",
            _ => return None,
        })
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Reason({:#x})", self.0),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
