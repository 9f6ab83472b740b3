//! # parachute-wire
//!
//! The shared vocabulary of the parachute RPC framework: status codes, the
//! error model, call descriptors, and the frames exchanged on a connection.
//!
//! Nothing here performs I/O. The frames are plain values; moving them is the
//! job of a transport.

pub mod code;
pub mod error;
pub mod frame;
pub mod headers;
pub mod spec;

pub use code::Code;
pub use error::BoxError;
pub use error::Error;
pub use error::Result;
pub use error::Status;
pub use error::code_of;
pub use frame::Frame;
pub use frame::Reason;
pub use frame::StreamId;
pub use headers::Headers;
pub use spec::Spec;
pub use spec::StreamType;

#[cfg(test)]
mod tests;
