//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur during audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Audio host error (device enumeration, backend failures).
    #[error("Audio host error: {0}")]
    Host(String),

    /// Audio device not found.
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Audio format not supported.
    #[error("Audio format not supported: {0}")]
    FormatNotSupported(String),

    /// Invalid source or assembler configuration.
    #[error("Invalid audio configuration: {0}")]
    InvalidConfig(String),

    /// The input stream could not be built.
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// The stream failed while running.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Capture already started.
    #[error("Audio capture already started")]
    AlreadyStarted,

    /// Device lost during capture.
    #[error("Audio device lost")]
    DeviceLost,

    /// Channel send error.
    #[error("Failed to report capture status: channel disconnected")]
    ChannelDisconnected,

    /// Capture thread could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<cpal::DeviceNameError> for AudioError {
    fn from(err: cpal::DeviceNameError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Self::FormatNotSupported(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => Self::DeviceLost,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                Self::FormatNotSupported(err.to_string())
            }
            other => Self::StreamBuild(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => Self::DeviceLost,
            other => Self::Stream(other.to_string()),
        }
    }
}

impl From<cpal::StreamError> for AudioError {
    fn from(err: cpal::StreamError) -> Self {
        match err {
            cpal::StreamError::DeviceNotAvailable => Self::DeviceLost,
            other => Self::Stream(other.to_string()),
        }
    }
}
