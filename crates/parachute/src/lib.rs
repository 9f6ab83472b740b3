//! # parachute
//!
//! An RPC server framework whose handlers may panic safely.
//!
//! Every handler invocation runs inside a panic guard. A panic is either
//! recovered, turned by the configured `RecoverPolicy` into an ordinary RPC
//! error, or, when its payload is a registered sentinel such as
//! `AbortHandler`, allowed to unwind into the transport boundary, which
//! resets the stream. Clients can tell the two apart by code alone: a
//! recovered panic carries the policy's code, a reset is always `internal`.
//!
//! Requires `panic = "unwind"` (the default); with `panic = "abort"` there is
//! nothing to recover.

pub mod client;
pub mod config;
pub mod context;
pub mod handler;
pub mod invoke;
pub mod memory;
pub mod recover;
pub mod sentinel;
pub mod server;
pub mod transport;

pub use client::Client;
pub use client::ServerStreamForClient;
pub use config::Config;
pub use config::ConfigBuilder;
pub use context::ConnectionId;
pub use context::Context;
pub use handler::CallState;
pub use handler::Request;
pub use handler::Response;
pub use handler::ServerStream;
pub use handler::StreamState;
pub use memory::MemoryTransport;
pub use recover::DefaultPolicy;
pub use recover::RecoverPolicy;
pub use recover::Recovered;
pub use sentinel::AbortHandler;
pub use sentinel::Sentinels;
pub use sentinel::abort_handler;
pub use server::Server;
pub use server::ServerBuilder;
pub use transport::Transport;

pub use parachute_wire::BoxError;
pub use parachute_wire::Code;
pub use parachute_wire::Error;
pub use parachute_wire::Headers;
pub use parachute_wire::Result;
pub use parachute_wire::Spec;
pub use parachute_wire::Status;
pub use parachute_wire::StreamType;
pub use parachute_wire::code_of;
