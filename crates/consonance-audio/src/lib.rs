//! Audio sources and frame assembly for the ConsoNance pipeline.
//!
//! This crate provides loopback capture of playback devices via cpal,
//! a self-paced tone generator, and the assembler that cuts arbitrary
//! sample chunks into fixed codec frames.

mod assembler;
mod capture;
mod device;
mod error;
mod pacing;
mod source;
mod stop;
mod tone;

pub use assembler::FrameAssembler;
pub use capture::{CaptureConfig, LoopbackCapture};
pub use device::{CpalDeviceDirectory, DeviceDirectory};
pub use error::AudioError;
pub use pacing::{PacingOutcome, PacingSource};
pub use source::{ChunkCallback, ChunkSource};
pub use stop::StopToken;
pub use tone::{ToneGenerator, ToneSpec};

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Largest positive 16-bit sample, used to scale normalized audio.
pub const FULL_SCALE: f32 = i16::MAX as f32;

/// Capacity of the channel carrying stream errors out of the capture callback.
pub const ERROR_CHANNEL_CAPACITY: usize = 16;
