//! Per-call execution context handed to handlers and recovery policies.

use std::fmt;

use tokio::sync::watch;

use parachute_wire::StreamId;

/// Strong type for connection identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifies a call and carries its cancellation signal.
///
/// Cancellation is cooperative: handlers poll `is_cancelled()` or await
/// `cancelled()` and return an ordinary error. It never travels through the
/// panic recovery path.
#[derive(Clone, Debug)]
pub struct Context {
    connection: ConnectionId,
    stream: StreamId,
    cancel: watch::Receiver<bool>,
}

impl Context {
    /// Creates a context together with the handle that cancels it.
    pub fn new(connection: ConnectionId, stream: StreamId) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self { connection, stream, cancel: rx };
        (ctx, CancelHandle { tx })
    }

    /// A context that is never cancelled, for driving invokers directly.
    pub fn background() -> Self {
        Self::new(ConnectionId(0), StreamId(0)).0
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the call is cancelled.
    ///
    /// If the cancel handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            let cancelled = *rx.borrow_and_update();
            if cancelled {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// The owning side of a call's cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
