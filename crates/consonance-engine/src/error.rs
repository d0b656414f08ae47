//! Error types for the engine.

use thiserror::Error;

use consonance_audio::AudioError;
use consonance_encoder::EncoderError;
use consonance_ipc::ConfigError;

/// Errors returned synchronously by session lifecycle commands.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The source could not be resolved or started.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// The encoder could not be created.
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    /// A session thread could not be spawned.
    #[error("Failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl EngineError {
    /// Returns true if the error means the requested device does not exist.
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, Self::Audio(AudioError::DeviceNotFound(_)))
    }
}
