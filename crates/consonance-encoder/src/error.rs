//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur during encoding operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Encoder could not be created or configured.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The codec rejected a frame.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),
}
