use tokio::sync::mpsc;

use crate::protocol::ClientMessage;

/// Per-connection FIFO queue ensuring serial execution of requests.
///
/// The reader pushes and moves on, so a long-running step never stops the
/// connection from noticing that the client went away.
pub struct LaneQueue {
    tx: mpsc::Sender<ClientMessage>,
}

impl LaneQueue {
    /// Create a new lane and return (queue_handle, receiver).
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ClientMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Enqueue a request. Returns false once the lane processor has stopped.
    pub async fn push(&self, message: ClientMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }
}
