//! Per-connection outbound queue
//!
//! The registry owns the sending half; the connection's writer task owns the
//! receiving half and turns messages into WebSocket frames. Dropping the
//! sender ends the writer task, which closes the socket.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::messages::ServerMessage;

/// Result of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task
    Sent,
    /// Queue is at capacity; the message was not queued
    Full,
    /// Writer task is gone
    Closed,
}

/// Sending half of a connection's outbound queue
#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbox {
    /// Create a bounded outbox and the receiver its writer task drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting
    pub fn deliver(&self, msg: ServerMessage) -> Delivery {
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
