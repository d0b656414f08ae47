//! Loopback capture of a playback device using cpal.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use consonance_ipc::PipelineConfig;

use crate::device::find_output_device;
use crate::error::AudioError;
use crate::source::{ChunkCallback, ChunkSource};
use crate::stop::StopToken;
use crate::{AudioResult, ERROR_CHANNEL_CAPACITY, FULL_SCALE};

/// Stream parameters requested from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Callback period in samples per channel (one frame).
    pub period_samples: u32,

    /// Number of periods the backend should buffer.
    pub buffer_periods: u32,
}

impl CaptureConfig {
    /// Derive capture parameters from the pipeline configuration.
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            period_samples: config.frame_samples() as u32,
            buffer_periods: config.effective_buffer_periods(),
        }
    }

    fn stream_config(&self, buffer_size: BufferSize) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size,
        }
    }

    fn scratch_capacity(&self) -> usize {
        self.period_samples as usize * self.channels as usize * self.buffer_periods as usize
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

/// Captures what a playback device renders.
///
/// The cpal stream lives on a dedicated thread for its whole life and is
/// dropped there on stop.
pub struct LoopbackCapture {
    device_name: String,
    config: CaptureConfig,
    stop: StopToken,
    capture_thread: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
}

impl LoopbackCapture {
    /// Create a capture for the named playback device.
    pub fn new(device_name: String, config: CaptureConfig) -> Self {
        Self {
            device_name,
            config,
            stop: StopToken::new(),
            capture_thread: None,
            error_rx: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                warn!(device = %self.device_name, "Capture thread panicked");
            }
        }
    }
}

impl ChunkSource for LoopbackCapture {
    #[instrument(name = "loopback_capture_start", skip(self, on_chunk), fields(device = %self.device_name))]
    fn start(&mut self, on_chunk: ChunkCallback) -> AudioResult<()> {
        if self.capture_thread.is_some() {
            return Err(AudioError::AlreadyStarted);
        }

        info!(
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            period = self.config.period_samples,
            buffer_periods = self.config.buffer_periods,
            "Starting loopback capture"
        );

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<AudioResult<()>>(1);
        let (error_tx, error_rx) = crossbeam_channel::bounded(ERROR_CHANNEL_CAPACITY);

        self.stop = StopToken::new();
        let stop = self.stop.clone();
        let device_name = self.device_name.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("capture-loopback".to_string())
            .spawn(move || capture_thread(device_name, config, on_chunk, ready_tx, error_tx, stop))?;
        self.capture_thread = Some(handle);

        let started = ready_rx
            .recv()
            .unwrap_or(Err(AudioError::ChannelDisconnected));
        if let Err(e) = started {
            self.stop.signal();
            self.join_thread();
            return Err(e);
        }

        self.error_rx = Some(error_rx);
        Ok(())
    }

    #[instrument(name = "loopback_capture_stop", skip(self), fields(device = %self.device_name))]
    fn stop(&mut self) {
        if self.capture_thread.is_none() {
            return;
        }

        info!("Stopping loopback capture");
        self.stop.signal();
        self.join_thread();
        self.error_rx = None;
    }

    fn take_error(&mut self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    fn is_running(&self) -> bool {
        self.capture_thread.is_some()
    }

    fn description(&self) -> String {
        format!("loopback:{}", self.device_name)
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        self.stop.signal();
        self.join_thread();
    }
}

fn capture_thread(
    device_name: String,
    config: CaptureConfig,
    on_chunk: ChunkCallback,
    ready_tx: Sender<AudioResult<()>>,
    error_tx: Sender<AudioError>,
    stop: StopToken,
) {
    let stream = match open_stream(&device_name, &config, on_chunk, error_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    stop.wait();
    drop(stream);
    debug!(device = %device_name, "Loopback stream released");
}

fn open_stream(
    device_name: &str,
    config: &CaptureConfig,
    mut on_chunk: ChunkCallback,
    error_tx: Sender<AudioError>,
) -> AudioResult<cpal::Stream> {
    let device = find_output_device(device_name)?;
    let supported = device.default_output_config()?;

    // One frame per callback when the backend allows it.
    let buffer_size = match supported.buffer_size() {
        SupportedBufferSize::Range { min, max }
            if (*min..=*max).contains(&config.period_samples) =>
        {
            BufferSize::Fixed(config.period_samples)
        }
        _ => {
            debug!(
                device = %device_name,
                period = config.period_samples,
                "Fixed callback period unavailable, using backend default"
            );
            BufferSize::Default
        }
    };
    let stream_config = config.stream_config(buffer_size);

    let on_error = move |err: cpal::StreamError| {
        let _ = error_tx.try_send(AudioError::from(err));
    };

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| on_chunk(data),
            on_error,
            None,
        )?,
        SampleFormat::F32 => {
            let mut scratch: Vec<i16> = Vec::with_capacity(config.scratch_capacity());
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * FULL_SCALE) as i16),
                    );
                    on_chunk(&scratch);
                },
                on_error,
                None,
            )?
        }
        other => {
            return Err(AudioError::FormatNotSupported(format!(
                "sample format {other:?}"
            )))
        }
    };

    Ok(stream)
}
