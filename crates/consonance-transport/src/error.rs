//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Sink capacity must be at least one frame.
    #[error("Invalid sink capacity: {0}")]
    InvalidCapacity(usize),

    /// Channel disconnected.
    #[error("Channel disconnected")]
    ChannelDisconnected,
}
