//! In-process transports.

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use parachute_wire::Frame;

use crate::transport;
use crate::transport::Transport;

/// A duplex channel transport using bounded tokio mpsc channels.
///
/// Frames sent on one end appear on the other end's `recv()`. The bound plays
/// the role of flow control: a `send` waits while the peer is behind.
pub struct MemoryTransport {
    tx: mpsc::Sender<Frame>,
    rx: Mutex<mpsc::Receiver<Frame>>,
}

impl MemoryTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Frames sent on `a` are received by `b` and vice versa. A capacity of
    /// zero is treated as one.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (tx_a, rx_a) = mpsc::channel(capacity);
        let (tx_b, rx_b) = mpsc::channel(capacity);

        let a = Self {
            tx: tx_a,
            rx: Mutex::new(rx_b),
        };

        let b = Self {
            tx: tx_b,
            rx: Mutex::new(rx_a),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: Frame) -> transport::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Frame>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
