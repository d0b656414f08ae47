//! Opus encoder.

use bytes::Bytes;
use opus::{Application, Bitrate, Channels, Encoder};
use tracing::{debug, instrument};

use crate::error::EncoderError;
use crate::{AudioEncoder, AudioEncoderConfig, EncodedFrame, EncoderResult, MAX_PACKET_SIZE};

/// Frame sizes (samples per channel) Opus accepts at 48 kHz.
const VALID_FRAME_SAMPLES: [usize; 6] = [120, 240, 480, 960, 1920, 2880];

/// Opus encoder tuned for music-quality loopback audio.
pub struct OpusEncoder {
    encoder: Encoder,
    config: AudioEncoderConfig,
    /// Reused output buffer.
    packet: Vec<u8>,
    frames_encoded: u64,
}

impl OpusEncoder {
    /// Create a new Opus encoder.
    #[instrument(name = "opus_encoder_new", skip(config))]
    pub fn new(config: AudioEncoderConfig) -> EncoderResult<Self> {
        if config.sample_rate != 48000 {
            return Err(EncoderError::Initialization(format!(
                "Unsupported sample rate: {}",
                config.sample_rate
            )));
        }
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(EncoderError::Initialization(format!(
                    "Unsupported channel count: {other}"
                )))
            }
        };
        if !VALID_FRAME_SAMPLES.contains(&config.frame_samples) {
            return Err(EncoderError::Initialization(format!(
                "Unsupported frame size: {} samples",
                config.frame_samples
            )));
        }

        let mut encoder = Encoder::new(config.sample_rate, channels, Application::Audio)
            .map_err(|e| EncoderError::Initialization(e.to_string()))?;

        if let Some(kbps) = config.bitrate_kbps {
            encoder
                .set_bitrate(Bitrate::Bits(kbps as i32 * 1000))
                .map_err(|e| EncoderError::Initialization(format!("Failed to set bitrate: {e}")))?;
        }

        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            frame_samples = config.frame_samples,
            bitrate_kbps = ?config.bitrate_kbps,
            "Opus encoder created"
        );

        Ok(Self {
            encoder,
            config,
            packet: vec![0u8; MAX_PACKET_SIZE],
            frames_encoded: 0,
        })
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> EncoderResult<EncodedFrame> {
        let expected = self.config.samples_per_frame();
        if pcm.len() != expected {
            return Err(EncoderError::InvalidInput(format!(
                "expected {expected} samples, got {}",
                pcm.len()
            )));
        }

        let len = self
            .encoder
            .encode(pcm, &mut self.packet)
            .map_err(|e| EncoderError::Encoding(e.to_string()))?;

        let frame = EncodedFrame {
            data: Bytes::copy_from_slice(&self.packet[..len]),
            sequence: self.frames_encoded,
        };
        self.frames_encoded += 1;
        Ok(frame)
    }

    fn config(&self) -> &AudioEncoderConfig {
        &self.config
    }

    fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    fn name(&self) -> &'static str {
        "opus"
    }
}
