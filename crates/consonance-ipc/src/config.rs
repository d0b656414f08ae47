//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only sample rate the pipeline runs at.
pub const SUPPORTED_SAMPLE_RATE: u32 = 48000;

/// The only channel layout the pipeline runs at (interleaved stereo).
pub const SUPPORTED_CHANNELS: u16 = 2;

/// Frame durations the codec accepts at 48 kHz.
pub const SUPPORTED_FRAME_DURATIONS_MS: [u32; 4] = [10, 20, 40, 60];

/// Outbound queue depth in frames (640ms at 20ms per frame).
pub const DEFAULT_SINK_CAPACITY: usize = 32;

/// Loopback buffer periods used when the configured value is zero.
pub const DEFAULT_BUFFER_PERIODS: u32 = 4;

/// Errors raised by [`PipelineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unsupported sample rate: {0} Hz (only {SUPPORTED_SAMPLE_RATE} Hz is supported)")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count: {0} (only stereo is supported)")]
    UnsupportedChannels(u16),

    #[error("Unsupported frame duration: {0} ms")]
    UnsupportedFrameDuration(u32),

    #[error("Sink capacity must be at least 1")]
    ZeroSinkCapacity,

    #[error("Sink readiness poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("Encode failure threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("Bitrate out of range: {0} kbps (expected 6-510)")]
    BitrateOutOfRange(u32),
}

/// Configuration consumed by the pipeline core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Duration of one frame in milliseconds.
    pub frame_duration_ms: u32,

    /// Capacity of the outbound sink, in encoded frames.
    pub sink_capacity: usize,

    /// Playback device to capture in loopback mode (None for the default).
    pub device_name: Option<String>,

    /// Loopback buffer depth in frame periods (0 means the default of 4).
    pub buffer_periods: u32,

    /// Target encoder bitrate in kbps (None lets the codec choose).
    pub bitrate_kbps: Option<u32>,

    /// How long to wait for the sink to report readiness.
    pub ready_timeout_ms: u64,

    /// How often to poll the sink's readiness while waiting.
    pub ready_poll_interval_ms: u64,

    /// Consecutive encode failures tolerated before the session aborts.
    pub max_consecutive_encode_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SUPPORTED_SAMPLE_RATE,
            channels: SUPPORTED_CHANNELS,
            frame_duration_ms: 20,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            device_name: None,
            buffer_periods: 0,
            bitrate_kbps: None,
            ready_timeout_ms: 10_000,
            ready_poll_interval_ms: 100,
            max_consecutive_encode_failures: 50,
        }
    }
}

impl PipelineConfig {
    /// Check that the configuration describes a format the pipeline can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate != SUPPORTED_SAMPLE_RATE {
            return Err(ConfigError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.channels != SUPPORTED_CHANNELS {
            return Err(ConfigError::UnsupportedChannels(self.channels));
        }
        if !SUPPORTED_FRAME_DURATIONS_MS.contains(&self.frame_duration_ms) {
            return Err(ConfigError::UnsupportedFrameDuration(self.frame_duration_ms));
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::ZeroSinkCapacity);
        }
        if self.ready_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_consecutive_encode_failures == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if let Some(kbps) = self.bitrate_kbps {
            if !(6..=510).contains(&kbps) {
                return Err(ConfigError::BitrateOutOfRange(kbps));
            }
        }
        Ok(())
    }

    /// Samples per channel in one frame (960 for 20 ms at 48 kHz).
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Interleaved samples in one frame (1920 for 20 ms stereo).
    pub fn samples_per_frame(&self) -> usize {
        self.frame_samples() * self.channels as usize
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_duration_ms))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    /// Buffer periods with zero mapped to the default.
    pub fn effective_buffer_periods(&self) -> u32 {
        if self.buffer_periods == 0 {
            DEFAULT_BUFFER_PERIODS
        } else {
            self.buffer_periods
        }
    }

    /// Expected loopback buffering latency (periods x frame duration).
    pub fn buffering_latency(&self) -> Duration {
        self.frame_duration() * self.effective_buffer_periods()
    }
}
