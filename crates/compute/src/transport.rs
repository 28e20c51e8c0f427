//! Outbound side of the compute channel.

use parking_lot::Mutex;
use streaming::Envelope;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The service end of the channel is gone.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "compute service channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Fire-and-forget delivery of envelopes to the compute service.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

impl Transport for UnboundedSender<Envelope> {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        UnboundedSender::send(self, envelope).map_err(|_| TransportError::Closed)
    }
}

/// Keeps every envelope in memory instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Names of the recorded commands, in send order.
    pub fn commands(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.command.clone()).collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.sent.lock().push(envelope);
        Ok(())
    }
}
