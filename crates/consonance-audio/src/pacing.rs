//! Real-time pacing of synthetic sources.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use consonance_ipc::PipelineConfig;

use crate::stop::StopToken;
use crate::tone::{ToneGenerator, ToneSpec};
use crate::AudioResult;

/// How a paced run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingOutcome {
    /// Every frame was dispatched.
    Completed { frames: u64 },

    /// The stop token was signaled.
    Cancelled { frames: u64 },

    /// The frame callback asked to stop.
    Aborted { frames: u64 },
}

impl PacingOutcome {
    /// Frames dispatched before the run ended.
    pub fn frames(&self) -> u64 {
        match *self {
            Self::Completed { frames } | Self::Cancelled { frames } | Self::Aborted { frames } => {
                frames
            }
        }
    }
}

/// Drives a [`ToneGenerator`] at one frame per frame duration.
///
/// After each frame it sleeps for whatever is left of the frame duration,
/// so output tracks wall-clock time within one frame of jitter.
pub struct PacingSource {
    generator: ToneGenerator,
    frame_duration: Duration,
    frame: Vec<i16>,
}

impl PacingSource {
    /// Create a paced tone source.
    pub fn new(spec: ToneSpec, config: &PipelineConfig) -> AudioResult<Self> {
        let generator = ToneGenerator::new(spec, config)?;
        let frame = vec![0; generator.frame_len()];

        Ok(Self {
            generator,
            frame_duration: config.frame_duration(),
            frame,
        })
    }

    /// Frames a complete run dispatches.
    pub fn frame_count(&self) -> u64 {
        self.generator.frame_count()
    }

    /// Dispatch frames to `on_frame` until the tone ends, `stop` is
    /// signaled, or `on_frame` returns false.
    pub fn run<F>(&mut self, stop: &StopToken, mut on_frame: F) -> PacingOutcome
    where
        F: FnMut(&[i16]) -> bool,
    {
        debug!(
            frames = self.generator.frame_count(),
            frame_ms = self.frame_duration.as_millis() as u64,
            "Paced source starting"
        );
        let mut frames = 0;

        loop {
            if stop.is_signaled() {
                return PacingOutcome::Cancelled { frames };
            }

            let started = Instant::now();
            if !self.generator.next_frame(&mut self.frame) {
                return PacingOutcome::Completed { frames };
            }
            frames += 1;

            if !on_frame(&self.frame) {
                return PacingOutcome::Aborted { frames };
            }

            let remaining = self.frame_duration.saturating_sub(started.elapsed());
            trace!(frame = frames, sleep_us = remaining.as_micros() as u64, "Frame paced");
            if stop.wait_timeout(remaining) {
                return PacingOutcome::Cancelled { frames };
            }
        }
    }
}
