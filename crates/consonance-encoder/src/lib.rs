//! Opus audio encoding.
//!
//! This crate wraps one stateful codec instance per session behind the
//! [`AudioEncoder`] trait: one PCM frame in, one encoded frame out.

mod error;
mod opus;

pub use error::EncoderError;
pub use opus::OpusEncoder;

use bytes::Bytes;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Largest packet the encoder will write for a single frame.
pub const MAX_PACKET_SIZE: usize = 4000;

/// Audio encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of channels.
    pub channels: u16,

    /// Samples per channel in each frame.
    pub frame_samples: usize,

    /// Target bitrate in kbps (None lets the codec choose).
    pub bitrate_kbps: Option<u32>,
}

impl AudioEncoderConfig {
    /// Interleaved samples the encoder expects per frame.
    pub fn samples_per_frame(&self) -> usize {
        self.frame_samples * self.channels as usize
    }
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            frame_samples: 960,
            bitrate_kbps: None,
        }
    }
}

/// One encoded audio frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Opaque codec payload.
    pub data: Bytes,

    /// Position of this frame within its session, for diagnostics.
    pub sequence: u64,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Trait for audio encoders.
pub trait AudioEncoder: Send {
    /// Encode exactly one interleaved PCM frame.
    fn encode(&mut self, pcm: &[i16]) -> EncoderResult<EncodedFrame>;

    /// The configuration the encoder was built with.
    fn config(&self) -> &AudioEncoderConfig;

    /// Frames successfully encoded so far.
    fn frames_encoded(&self) -> u64;

    /// Get encoder name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create an audio encoder.
pub fn create_audio_encoder(config: &AudioEncoderConfig) -> EncoderResult<Box<dyn AudioEncoder>> {
    let encoder = OpusEncoder::new(config.clone())?;
    Ok(Box::new(encoder))
}
