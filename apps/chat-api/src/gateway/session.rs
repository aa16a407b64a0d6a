//! Per-connection session state and its bounded outbound queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Slots in a session's outbound queue. A full queue tears the session down
/// (dropped client) rather than applying backpressure to the sender.
pub const OUTBOUND_QUEUE_SLOTS: usize = 256;

/// One live gateway connection bound to an authenticated identity.
///
/// Ephemeral and in-memory only; ownership transfers to the hub at
/// registration, and dropping it closes the outbound queue.
pub struct ConnectionSession {
    /// Unique session identifier (`ses_`-prefixed ULID).
    pub session_id: String,
    /// The authenticated identity that owns this connection.
    pub identity: String,
    sender: mpsc::Sender<String>,
}

impl ConnectionSession {
    /// Create a session and the receiving half of its outbound queue. The
    /// connection task drains the receiver into the transport.
    pub fn channel(identity: String) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_SLOTS);
        (
            Self {
                session_id: chat_common::id::prefixed_ulid(chat_common::id::prefix::SESSION),
                identity,
                sender,
            },
            receiver,
        )
    }

    /// Enqueue a payload without blocking. Errors when the queue is full or
    /// the draining pump is gone.
    pub(crate) fn try_push(&self, payload: String) -> Result<(), TrySendError<String>> {
        self.sender.try_send(payload)
    }
}
