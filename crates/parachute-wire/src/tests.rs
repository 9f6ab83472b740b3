use std::fmt;

use crate::*;

/// A foreign error that wraps an `Error` as its source.
#[derive(Debug)]
struct Wrapped(Error);

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wrapped")
    }
}

impl std::error::Error for Wrapped {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

// ============================================================================
//  CODES
// ============================================================================

#[test]
fn test_codes_are_unique() {
    for (i, a) in Code::ALL.iter().enumerate() {
        for b in &Code::ALL[i + 1..] {
            assert_ne!(a.as_u32(), b.as_u32());
            assert_ne!(a.as_str(), b.as_str());
        }
    }
}

#[test]
fn test_code_lookup() {
    assert_eq!(Code::from_u32(9), Some(Code::FailedPrecondition));
    assert_eq!(Code::from_u32(13), Some(Code::Internal));
    assert_eq!(Code::from_u32(0), None);
    assert_eq!(Code::from_u32(17), None);
    assert_eq!(Code::from_name("failed_precondition"), Some(Code::FailedPrecondition));
    assert_eq!(Code::from_name("FailedPrecondition"), None);
    assert_eq!(Code::Internal.to_string(), "internal");
}

// ============================================================================
//  ERRORS
// ============================================================================

#[test]
fn test_error_display_and_message() {
    let err = Error::new(Code::FailedPrecondition, "panic: 42");
    assert_eq!(err.code(), Code::FailedPrecondition);
    assert_eq!(err.message(), "panic: 42");
    assert_eq!(err.to_string(), "failed_precondition: panic: 42");
}

#[test]
fn test_code_of_rpc_error() {
    let err = Error::new(Code::NotFound, "missing");
    assert_eq!(code_of(&err), Code::NotFound);
}

#[test]
fn test_code_of_foreign_error_is_unknown() {
    let err = std::io::Error::other("disk on fire");
    assert_eq!(code_of(&err), Code::Unknown);
}

#[test]
fn test_code_of_walks_source_chain() {
    let err = Wrapped(Error::new(Code::Aborted, "conflict"));
    assert_eq!(code_of(&err), Code::Aborted);
}

#[test]
fn test_from_boxed_unwraps_rpc_error() {
    let boxed: BoxError = Box::new(Error::new(Code::PermissionDenied, "nope"));
    let err = Error::from_boxed(boxed);
    assert_eq!(err.code(), Code::PermissionDenied);
    assert_eq!(err.message(), "nope");
}

#[test]
fn test_from_boxed_wraps_foreign_error_as_unknown() {
    let boxed: BoxError = "plain string error".into();
    let err = Error::from_boxed(boxed);
    assert_eq!(err.code(), Code::Unknown);
    assert_eq!(err.message(), "plain string error");
}

#[test]
fn test_status_crossing_preserves_code_and_message() {
    let err = Error::new(Code::FailedPrecondition, "panic: <empty>");
    let status = err.to_status();
    assert_eq!(status, Status::new(Code::FailedPrecondition, "panic: <empty>"));

    let back = Error::from(status);
    assert_eq!(back.code(), Code::FailedPrecondition);
    assert_eq!(back.to_string(), err.to_string());
}

// ============================================================================
//  RESETS
// ============================================================================

#[test]
fn test_internal_reset_maps_to_internal_code() {
    assert_eq!(Reason::INTERNAL_ERROR.to_code(), Code::Internal);
}

#[test]
fn test_reset_code_mapping() {
    assert_eq!(Reason::NO_ERROR.to_code(), Code::Internal);
    assert_eq!(Reason::PROTOCOL_ERROR.to_code(), Code::Internal);
    assert_eq!(Reason::REFUSED_STREAM.to_code(), Code::Unavailable);
    assert_eq!(Reason::CANCEL.to_code(), Code::Canceled);
    assert_eq!(Reason::ENHANCE_YOUR_CALM.to_code(), Code::ResourceExhausted);
    assert_eq!(Reason::INADEQUATE_SECURITY.to_code(), Code::PermissionDenied);
    assert_eq!(Reason::HTTP_1_1_REQUIRED.to_code(), Code::Unknown);
    assert_eq!(Reason::STREAM_CLOSED.to_code(), Code::Unknown);
    assert_eq!(Reason(0xff).to_code(), Code::Unknown);
}

#[test]
fn test_reason_debug_names() {
    assert_eq!(format!("{:?}", Reason::INTERNAL_ERROR), "INTERNAL_ERROR");
    assert_eq!(format!("{:?}", Reason(0x42)), "Reason(0x42)");
}

// ============================================================================
//  FRAMES & HEADERS
// ============================================================================

#[test]
fn test_frame_stream_and_terminal() {
    let id = StreamId(7);
    let message = Frame::Message { stream: id, body: vec![1] };
    let end = Frame::End { stream: id, status: None };
    let reset = Frame::Reset { stream: id, reason: Reason::CANCEL };

    assert_eq!(message.stream(), id);
    assert!(!message.is_terminal());
    assert!(end.is_terminal());
    assert!(reset.is_terminal());
}

#[test]
fn test_headers_are_case_insensitive_multimap() {
    let mut headers = Headers::new();
    headers.append("X-Trace", "a");
    headers.append("x-trace", "b");
    headers.append("Accept", "proto");

    assert_eq!(headers.get("X-TRACE"), Some("a"));
    assert_eq!(headers.get_all("x-trace").collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(headers.len(), 3);

    headers.insert("x-trace", "c");
    assert_eq!(headers.get_all("x-trace").collect::<Vec<_>>(), vec!["c"]);
    assert_eq!(headers.get("missing"), None);
}

#[test]
fn test_spec_constructors() {
    let server = Spec::server("/ping.v1.PingService/Ping", StreamType::Unary);
    let client = Spec::client("/ping.v1.PingService/CountUp", StreamType::ServerStream);
    assert!(!server.is_client);
    assert!(client.is_client);
    assert_eq!(client.stream_type.to_string(), "server-stream");
}
