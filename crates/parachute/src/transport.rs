//! # Transport Abstraction
//!
//! A minimal, async interface for moving frames between a client and a server.
//!
//! ## Philosophy
//!
//! - **Frame-Oriented**: The Transport moves whole `Frame`s and never looks
//!   inside them. Routing by stream is the job of the endpoints.
//! - **Shared**: A single transport is written to concurrently by every call on
//!   the connection, so both directions take `&self`.

use std::fmt;

use parachute_wire::Frame;

/// Errors that occur at the connection layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One end of a connection.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a frame for the peer.
    ///
    /// Returns once the frame is accepted by the connection, which is what
    /// makes a streaming `send` synchronous with respect to its handler.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Waits for the next frame from the peer.
    ///
    /// # Invariants
    /// - Returns `Ok(None)` once the peer has gone away and no frames remain.
    async fn recv(&self) -> Result<Option<Frame>>;
}
