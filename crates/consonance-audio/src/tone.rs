//! Sine tone synthesis.

use std::f64::consts::TAU;

use consonance_ipc::PipelineConfig;

use crate::error::AudioError;
use crate::{AudioResult, FULL_SCALE};

const SAMPLE_TOLERANCE: f64 = 1e-3;

/// Parameters of a synthetic tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    /// Frequency in Hz.
    pub frequency_hz: f32,

    /// Length in seconds.
    pub duration_secs: f32,

    /// Peak amplitude as a fraction of full scale, clamped to 0.0 - 1.0.
    pub amplitude: f32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            duration_secs: 1.0,
            amplitude: 0.3,
        }
    }
}

/// Generates a tone one frame at a time, identical on every channel.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    spec: ToneSpec,
    sample_rate: u32,
    channels: usize,
    frame_samples: usize,
    total_samples: u64,
    position: u64,
}

impl ToneGenerator {
    /// Create a generator for the pipeline's frame geometry.
    pub fn new(spec: ToneSpec, config: &PipelineConfig) -> AudioResult<Self> {
        if !spec.frequency_hz.is_finite() || spec.frequency_hz <= 0.0 {
            return Err(AudioError::InvalidConfig(format!(
                "tone frequency must be positive, got {}",
                spec.frequency_hz
            )));
        }
        if !spec.duration_secs.is_finite() || spec.duration_secs < 0.0 {
            return Err(AudioError::InvalidConfig(format!(
                "tone duration must be non-negative, got {}",
                spec.duration_secs
            )));
        }
        let frame_samples = config.frame_samples();
        if frame_samples == 0 || config.channels == 0 {
            return Err(AudioError::InvalidConfig(
                "frame geometry must be non-zero".to_string(),
            ));
        }

        let spec = ToneSpec {
            amplitude: if spec.amplitude.is_finite() {
                spec.amplitude.clamp(0.0, 1.0)
            } else {
                0.0
            },
            ..spec
        };
        // A sample belongs to the tone if it starts before the end. The
        // tolerance absorbs f32 noise such as 0.1 s -> 4800.00007 samples.
        let exact = f64::from(spec.duration_secs) * f64::from(config.sample_rate);
        let total_samples = (exact - SAMPLE_TOLERANCE).ceil().max(0.0) as u64;

        Ok(Self {
            spec,
            sample_rate: config.sample_rate,
            channels: config.channels as usize,
            frame_samples,
            total_samples,
            position: 0,
        })
    }

    pub fn spec(&self) -> ToneSpec {
        self.spec
    }

    /// Interleaved length of every frame this generator writes.
    pub fn frame_len(&self) -> usize {
        self.frame_samples * self.channels
    }

    /// Total frames for the whole tone, counting a zero-padded tail.
    pub fn frame_count(&self) -> u64 {
        self.total_samples.div_ceil(self.frame_samples as u64)
    }

    /// Fill `frame` with the next frame. Returns false once the tone is done.
    ///
    /// `frame` must be exactly [`frame_len`](Self::frame_len) samples long.
    /// Samples past the end of the tone are written as silence.
    pub fn next_frame(&mut self, frame: &mut [i16]) -> bool {
        debug_assert_eq!(frame.len(), self.frame_len());
        if self.position >= self.total_samples {
            return false;
        }

        for (offset, slot) in frame.chunks_exact_mut(self.channels).enumerate() {
            let index = self.position + offset as u64;
            let value = if index < self.total_samples {
                self.sample_at(index)
            } else {
                0
            };
            slot.fill(value);
        }

        self.position += self.frame_samples as u64;
        true
    }

    fn sample_at(&self, index: u64) -> i16 {
        let phase = TAU * f64::from(self.spec.frequency_hz) * index as f64
            / f64::from(self.sample_rate);
        let scale = f64::from(self.spec.amplitude) * f64::from(FULL_SCALE);
        (phase.sin() * scale) as i16
    }
}
