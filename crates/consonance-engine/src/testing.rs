//! In-memory collaborators for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;

use consonance_audio::{
    AudioError, AudioResult, CaptureConfig, ChunkCallback, ChunkSource, DeviceDirectory,
    StopToken,
};
use consonance_encoder::{
    AudioEncoder, AudioEncoderConfig, EncodedFrame, EncoderError, EncoderResult,
};
use consonance_ipc::AudioDevice;
use consonance_transport::{BoundedSink, FrameSink, SinkReceiver};

use crate::controller::EncoderFactory;

/// Encoder that emits a tiny packet per frame and fails on a schedule.
pub(crate) struct ScriptedEncoder {
    config: AudioEncoderConfig,
    fail_every: Option<u64>,
    calls: u64,
    frames: u64,
}

impl ScriptedEncoder {
    pub(crate) fn working() -> Self {
        Self::with_schedule(None)
    }

    /// Fails every `n`th call.
    pub(crate) fn failing_every(n: u64) -> Self {
        Self::with_schedule(Some(n))
    }

    pub(crate) fn broken() -> Self {
        Self::with_schedule(Some(1))
    }

    fn with_schedule(fail_every: Option<u64>) -> Self {
        Self {
            config: AudioEncoderConfig::default(),
            fail_every,
            calls: 0,
            frames: 0,
        }
    }
}

impl AudioEncoder for ScriptedEncoder {
    fn encode(&mut self, pcm: &[i16]) -> EncoderResult<EncodedFrame> {
        self.calls += 1;
        if let Some(n) = self.fail_every {
            if self.calls % n == 0 {
                return Err(EncoderError::Encoding("scripted failure".to_string()));
            }
        }
        if pcm.len() != self.config.samples_per_frame() {
            return Err(EncoderError::InvalidInput(format!("{} samples", pcm.len())));
        }

        let frame = EncodedFrame {
            data: Bytes::from_static(&[0xf8, 0xff, 0xfe]),
            sequence: self.frames,
        };
        self.frames += 1;
        Ok(frame)
    }

    fn config(&self) -> &AudioEncoderConfig {
        &self.config
    }

    fn frames_encoded(&self) -> u64 {
        self.frames
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub(crate) fn working_encoders() -> EncoderFactory {
    Arc::new(|_config: &AudioEncoderConfig| -> EncoderResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(ScriptedEncoder::working()))
    })
}

pub(crate) fn broken_encoders() -> EncoderFactory {
    Arc::new(|_config: &AudioEncoderConfig| -> EncoderResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(ScriptedEncoder::broken()))
    })
}

/// Directory of fake playback devices whose sources push chunks from a thread.
pub(crate) struct FakeDirectory {
    devices: Vec<AudioDevice>,
    chunk_len: usize,
    chunk_interval: Duration,
    fail_after: Option<Duration>,
    opened: Arc<AtomicUsize>,
}

impl FakeDirectory {
    pub(crate) fn new() -> Self {
        Self {
            devices: vec![
                AudioDevice {
                    id: "fake:0".into(),
                    name: "Speakers".into(),
                    is_default: true,
                },
                AudioDevice {
                    id: "fake:1".into(),
                    name: "Headphones".into(),
                    is_default: false,
                },
            ],
            chunk_len: 700,
            chunk_interval: Duration::from_millis(5),
            fail_after: None,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sources report a stream error this long after starting.
    pub(crate) fn failing_after(mut self, delay: Duration) -> Self {
        self.fail_after = Some(delay);
        self
    }

    pub(crate) fn opened(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opened)
    }
}

impl DeviceDirectory for FakeDirectory {
    fn list_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self.devices.clone())
    }

    fn open_loopback(
        &self,
        device: &AudioDevice,
        _config: &CaptureConfig,
    ) -> AudioResult<Box<dyn ChunkSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            device: device.name.clone(),
            chunk_len: self.chunk_len,
            chunk_interval: self.chunk_interval,
            fail_after: self.fail_after,
            started: None,
            failed: false,
            stop: StopToken::new(),
            thread: None,
        }))
    }
}

pub(crate) struct FakeSource {
    device: String,
    chunk_len: usize,
    chunk_interval: Duration,
    fail_after: Option<Duration>,
    started: Option<Instant>,
    failed: bool,
    stop: StopToken,
    thread: Option<JoinHandle<()>>,
}

impl ChunkSource for FakeSource {
    fn start(&mut self, mut on_chunk: ChunkCallback) -> AudioResult<()> {
        if self.thread.is_some() {
            return Err(AudioError::AlreadyStarted);
        }
        let stop = self.stop.clone();
        let chunk = vec![100i16; self.chunk_len];
        let interval = self.chunk_interval;
        self.thread = Some(thread::spawn(move || {
            while !stop.wait_timeout(interval) {
                on_chunk(&chunk);
            }
        }));
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.signal();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn take_error(&mut self) -> Option<AudioError> {
        let (Some(delay), Some(started)) = (self.fail_after, self.started) else {
            return None;
        };
        if !self.failed && started.elapsed() >= delay {
            self.failed = true;
            return Some(AudioError::DeviceLost);
        }
        None
    }

    fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn description(&self) -> String {
        format!("fake:{}", self.device)
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sink wrapper that records whether two sessions ever write at once.
pub(crate) struct ExclusiveSink {
    inner: Arc<BoundedSink>,
    active: AtomicUsize,
    violations: AtomicUsize,
    ready: AtomicBool,
}

impl ExclusiveSink {
    pub(crate) fn new(capacity: usize) -> (Arc<Self>, SinkReceiver) {
        let (inner, rx) = BoundedSink::new(capacity, "exclusive").unwrap();
        let sink = Arc::new(Self {
            inner,
            active: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
            ready: AtomicBool::new(true),
        });
        (sink, rx)
    }

    pub(crate) fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl FrameSink for ExclusiveSink {
    fn try_push(&self, frame: EncodedFrame) -> bool {
        if self.active.load(Ordering::SeqCst) != 1 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.try_push(frame)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_speaking(&self, speaking: bool) {
        let now = if speaking {
            self.active.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.active.fetch_sub(1, Ordering::SeqCst) - 1
        };
        if now > 1 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}
