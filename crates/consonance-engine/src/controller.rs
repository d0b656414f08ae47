//! Session lifecycle: start, stop, supersede, report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use consonance_audio::{
    CaptureConfig, ChunkSource, DeviceDirectory, PacingSource, ToneSpec,
};
use consonance_encoder::{
    create_audio_encoder, AudioEncoder, AudioEncoderConfig, EncoderResult,
};
use consonance_ipc::{
    AudioDevice, PipelineConfig, SessionState, SessionStatus, SourceRequest, StartupPhase,
    StopReason,
};
use consonance_transport::FrameSink;

use crate::pipeline::FramePipeline;
use crate::session::{Session, SessionView};
use crate::EngineResult;

/// Builds one encoder per session.
pub type EncoderFactory =
    Arc<dyn Fn(&AudioEncoderConfig) -> EncoderResult<Box<dyn AudioEncoder>> + Send + Sync>;

enum PreparedSource {
    Tone(PacingSource),
    Capture(Box<dyn ChunkSource>),
}

/// Owns at most one session and serializes every start and stop.
///
/// Start and stop hold the lifecycle lock for their whole duration, so a
/// new session is only created after the previous one has fully released
/// its source, encoder and sink. Status reads go through a separately
/// published view and never wait on a start in progress.
pub struct SessionController {
    config: PipelineConfig,
    directory: Arc<dyn DeviceDirectory>,
    encoder_factory: EncoderFactory,
    current: Mutex<Option<Session>>,
    published: RwLock<Option<Arc<SessionView>>>,
    next_id: AtomicU64,
}

impl SessionController {
    /// Create a controller that encodes with Opus.
    pub fn new(config: PipelineConfig, directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            config,
            directory,
            encoder_factory: Arc::new(create_audio_encoder),
            current: Mutex::new(None),
            published: RwLock::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Replace the encoder factory.
    pub fn with_encoder_factory(mut self, factory: EncoderFactory) -> Self {
        self.encoder_factory = factory;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a session writing to `sink`, stopping any current session first.
    ///
    /// Returns the new session's id. Configuration, device and encoder
    /// failures are returned here and the session never streams.
    #[instrument(name = "session_start", skip(self, source, sink), fields(kind = source.kind()))]
    pub fn start(&self, source: SourceRequest, sink: Arc<dyn FrameSink>) -> EngineResult<u64> {
        let mut current = self.current.lock();

        if let Some(mut previous) = current.take() {
            if previous.request_stop(StopReason::Superseded) {
                info!(
                    session = previous.view().id(),
                    "Stopping current session before starting a new one"
                );
            }
            previous.join();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let view = Arc::new(SessionView::new(
            id,
            source.clone(),
            sink.label().to_string(),
        ));
        *self.published.write() = Some(Arc::clone(&view));

        match self.launch(&view, source, sink) {
            Ok(session) => {
                info!(session = id, "Session streaming");
                *current = Some(session);
                Ok(id)
            }
            Err(e) => {
                warn!(session = id, "Session failed to start: {}", e);
                view.fail(StopReason::StartFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn launch(
        &self,
        view: &Arc<SessionView>,
        source: SourceRequest,
        sink: Arc<dyn FrameSink>,
    ) -> EngineResult<Session> {
        view.set_state(SessionState::Starting {
            phase: StartupPhase::ValidateConfig,
        });
        self.config.validate()?;

        view.set_state(SessionState::Starting {
            phase: StartupPhase::ResolveSource,
        });
        let prepared = self.prepare_source(view, &source)?;

        view.set_state(SessionState::Starting {
            phase: StartupPhase::InitEncoder,
        });
        let encoder = (self.encoder_factory)(&self.encoder_config())?;
        debug!(encoder = encoder.name(), "Encoder ready");
        let pipeline = FramePipeline::new(&self.config, encoder, Arc::clone(&sink), view.metrics())?;

        view.set_state(SessionState::Starting {
            phase: StartupPhase::AwaitSinkReady,
        });
        let degraded = !self.await_sink_ready(sink.as_ref());

        view.set_state(SessionState::Starting {
            phase: StartupPhase::StartSource,
        });
        match prepared {
            PreparedSource::Tone(pacing) => {
                sink.set_speaking(true);
                view.mark_streaming(degraded);
                Session::spawn_tone(Arc::clone(view), pacing, pipeline, Arc::clone(&sink))
                    .inspect_err(|_| sink.set_speaking(false))
            }
            PreparedSource::Capture(mut capture) => {
                let fault = pipeline.fault();
                let mut pipeline = pipeline;

                sink.set_speaking(true);
                if let Err(e) = capture.start(Box::new(move |chunk: &[i16]| {
                    pipeline.push_chunk(chunk);
                })) {
                    sink.set_speaking(false);
                    return Err(e.into());
                }
                view.mark_streaming(degraded);

                // The supervisor takes ownership of the capture; on spawn
                // failure it is dropped here, which stops the stream.
                Session::spawn_capture(
                    Arc::clone(view),
                    capture,
                    fault,
                    Arc::clone(&sink),
                    self.config.frame_duration(),
                )
                .inspect_err(|_| sink.set_speaking(false))
            }
        }
    }

    fn prepare_source(
        &self,
        view: &SessionView,
        source: &SourceRequest,
    ) -> EngineResult<PreparedSource> {
        match source {
            SourceRequest::Tone {
                frequency_hz,
                duration_secs,
                amplitude,
            } => {
                let spec = ToneSpec {
                    frequency_hz: *frequency_hz,
                    duration_secs: *duration_secs,
                    amplitude: *amplitude,
                };
                Ok(PreparedSource::Tone(PacingSource::new(spec, &self.config)?))
            }
            SourceRequest::Capture { device } => {
                let name = device.as_deref().or(self.config.device_name.as_deref());
                let device = self.directory.resolve(name)?;
                info!(
                    device = %device.name,
                    latency_ms = self.config.buffering_latency().as_millis() as u64,
                    "Capturing playback device"
                );
                view.set_device(device.name.clone());

                let capture_config = CaptureConfig::from_pipeline(&self.config);
                let capture = self.directory.open_loopback(&device, &capture_config)?;
                Ok(PreparedSource::Capture(capture))
            }
        }
    }

    fn encoder_config(&self) -> AudioEncoderConfig {
        AudioEncoderConfig {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            frame_samples: self.config.frame_samples(),
            bitrate_kbps: self.config.bitrate_kbps,
        }
    }

    /// Poll the sink until it is ready or the timeout passes.
    ///
    /// Returns false on timeout; the caller proceeds in degraded mode.
    fn await_sink_ready(&self, sink: &dyn FrameSink) -> bool {
        let timeout = self.config.ready_timeout();
        let poll = self.config.ready_poll_interval();
        let deadline = Instant::now() + timeout;

        loop {
            if sink.is_ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    sink = %sink.label(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Sink not ready after timeout, proceeding anyway"
                );
                return false;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Stop the streaming session. Returns false if nothing was streaming.
    pub fn stop(&self) -> bool {
        self.stop_with(StopReason::UserRequested)
    }

    /// Stop the streaming session with an explicit reason.
    #[instrument(name = "session_stop", skip(self))]
    pub fn stop_with(&self, reason: StopReason) -> bool {
        let mut current = self.current.lock();
        let Some(session) = current.as_mut() else {
            debug!("No session, ignoring stop");
            return false;
        };

        if !session.request_stop(reason) {
            debug!(
                state = %session.view().state().name(),
                "Session not streaming, ignoring stop"
            );
            if session.view().state().is_terminal() {
                session.join();
            }
            return false;
        }

        session.join();
        info!(session = session.view().id(), "Session stopped");
        true
    }

    /// Stop everything; used when the host is going away.
    pub fn shutdown(&self) {
        self.stop_with(StopReason::Shutdown);
        if let Some(mut session) = self.current.lock().take() {
            session.join();
        }
    }

    /// Current (or most recent) session status.
    pub fn status(&self) -> SessionStatus {
        self.published
            .read()
            .as_ref()
            .map(|view| view.status())
            .unwrap_or_default()
    }

    /// Wait until the current session has stopped.
    ///
    /// Returns true immediately if there is no session.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let view = self.published.read().clone();
        match view {
            Some(view) => view.wait_finished(timeout),
            None => true,
        }
    }

    /// Playback devices available for loopback capture.
    pub fn list_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        Ok(self.directory.list_devices()?)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{broken_encoders, working_encoders, ExclusiveSink, FakeDirectory};
    use crate::EngineError;
    use consonance_transport::BoundedSink;

    fn controller(config: PipelineConfig) -> SessionController {
        SessionController::new(config, Arc::new(FakeDirectory::new()))
            .with_encoder_factory(working_encoders())
    }

    fn short_tone(duration_secs: f32) -> SourceRequest {
        SourceRequest::Tone {
            frequency_hz: 440.0,
            duration_secs,
            amplitude: 0.3,
        }
    }

    #[test]
    fn test_beep_streams_fifty_opus_frames() {
        let controller =
            SessionController::new(PipelineConfig::default(), Arc::new(FakeDirectory::new()));
        let (sink, rx) = BoundedSink::new(64, "voice").unwrap();

        let id = controller.start(SourceRequest::beep(), sink.clone()).unwrap();
        assert_eq!(id, 1);
        assert!(controller.wait_until_stopped(Duration::from_secs(5)));

        let status = controller.status();
        assert_eq!(
            status.state,
            SessionState::Stopped {
                reason: StopReason::SourceExhausted
            }
        );
        assert_eq!(status.metrics.frames_produced, 50);
        assert_eq!(status.metrics.frames_encoded, 50);
        assert_eq!(status.metrics.frames_sent, 50);
        assert_eq!(status.metrics.samples_captured, 50 * 1920);
        assert_eq!(rx.len(), 50);
        assert!(!sink.is_speaking());
    }

    #[test]
    fn test_nonexistent_device_fails_before_any_frame() {
        let directory = FakeDirectory::new();
        let opened = directory.opened();
        let controller = SessionController::new(PipelineConfig::default(), Arc::new(directory))
            .with_encoder_factory(working_encoders());
        let (sink, rx) = BoundedSink::new(8, "voice").unwrap();

        let err = controller
            .start(
                SourceRequest::capture(Some("Nonexistent Device".into())),
                sink.clone(),
            )
            .unwrap_err();

        assert!(err.is_device_not_found());
        assert_eq!(opened.load(Ordering::SeqCst), 0);
        assert!(rx.is_empty());
        assert!(!sink.is_speaking());

        let status = controller.status();
        assert!(matches!(
            status.state,
            SessionState::Stopped {
                reason: StopReason::StartFailed { .. }
            }
        ));
        assert_eq!(status.metrics.frames_produced, 0);
    }

    #[test]
    fn test_capture_stop_is_prompt_and_idempotent() {
        let controller = controller(PipelineConfig::default());
        let (sink, rx) = BoundedSink::new(256, "voice").unwrap();

        controller.start(SourceRequest::capture(None), sink.clone()).unwrap();
        thread::sleep(Duration::from_millis(80));

        let status = controller.status();
        assert!(status.is_streaming());
        assert_eq!(status.device.as_deref(), Some("Speakers"));
        assert!(sink.is_speaking());
        assert!(status.metrics.frames_sent > 0);

        let started = Instant::now();
        assert!(controller.stop());
        assert!(started.elapsed() < controller.config().frame_duration() * 3);
        assert_eq!(
            controller.status().state,
            SessionState::Stopped {
                reason: StopReason::UserRequested
            }
        );
        assert!(!sink.is_speaking());

        let sent = rx.len();
        assert!(!controller.stop());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rx.len(), sent);
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let controller = controller(PipelineConfig::default());
        assert!(!controller.stop());
        assert!(controller.status().state.is_idle());
        assert!(controller.wait_until_stopped(Duration::ZERO));
    }

    #[test]
    fn test_start_supersedes_streaming_session() {
        let controller = controller(PipelineConfig::default());
        let (sink, _rx) = ExclusiveSink::new(256);

        let first = controller
            .start(SourceRequest::capture(None), sink.clone())
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        let second = controller
            .start(
                SourceRequest::capture(Some("Headphones".into())),
                sink.clone(),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(30));

        assert_eq!((first, second), (1, 2));
        let status = controller.status();
        assert!(status.is_streaming());
        assert_eq!(status.session_id, Some(2));
        assert_eq!(status.device.as_deref(), Some("Headphones"));
        assert_eq!(sink.active(), 1);

        controller.shutdown();
        assert_eq!(sink.active(), 0);
        assert_eq!(sink.violations(), 0);
    }

    #[test]
    fn test_concurrent_start_stop_never_overlaps() {
        let controller = Arc::new(controller(PipelineConfig::default()));
        let (sink, _rx) = ExclusiveSink::new(64);

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let controller = Arc::clone(&controller);
                let sink: Arc<dyn FrameSink> = sink.clone();
                thread::spawn(move || {
                    for step in 0..12 {
                        match (worker + step) % 3 {
                            0 => {
                                let _ = controller.start(SourceRequest::capture(None), sink.clone());
                            }
                            1 => {
                                let _ = controller.start(short_tone(0.06), sink.clone());
                            }
                            _ => {
                                controller.stop();
                            }
                        }
                        thread::sleep(Duration::from_millis((step % 4) as u64 * 3));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        controller.shutdown();

        assert_eq!(sink.violations(), 0);
        assert_eq!(sink.active(), 0);
        assert!(controller.status().state.is_terminal());
    }

    #[test]
    fn test_unready_sink_proceeds_degraded() {
        let config = PipelineConfig {
            ready_timeout_ms: 100,
            ready_poll_interval_ms: 10,
            ..Default::default()
        };
        let controller = controller(config);
        let (sink, _rx) = BoundedSink::new_pending(64, "voice").unwrap();

        let started = Instant::now();
        controller.start(short_tone(1.0), sink).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));

        let status = controller.status();
        assert_eq!(status.state, SessionState::Streaming { degraded: true });
        assert!(status.degraded);
        assert!(controller.stop());
    }

    #[test]
    fn test_sink_ready_during_wait_is_not_degraded() {
        let controller = controller(PipelineConfig::default());
        let (sink, _rx) = BoundedSink::new_pending(64, "voice").unwrap();

        let marker = sink.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            marker.mark_ready();
        });

        let started = Instant::now();
        controller.start(short_tone(1.0), sink).unwrap();
        handle.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!controller.status().degraded);
        assert!(controller.stop());
    }

    #[test]
    fn test_repeated_encode_failures_abort_session() {
        let config = PipelineConfig {
            max_consecutive_encode_failures: 3,
            ..Default::default()
        };
        let controller = SessionController::new(config, Arc::new(FakeDirectory::new()))
            .with_encoder_factory(broken_encoders());
        let (sink, rx) = BoundedSink::new(8, "voice").unwrap();

        controller.start(SourceRequest::capture(None), sink.clone()).unwrap();
        assert!(controller.wait_until_stopped(Duration::from_secs(2)));

        let status = controller.status();
        assert!(matches!(
            status.state,
            SessionState::Stopped {
                reason: StopReason::EncoderError { .. }
            }
        ));
        assert_eq!(status.metrics.encode_failures, 3);
        assert!(rx.is_empty());
        assert!(!sink.is_speaking());
        assert!(!controller.stop());
    }

    #[test]
    fn test_source_error_ends_session() {
        let directory = FakeDirectory::new().failing_after(Duration::from_millis(30));
        let controller = SessionController::new(PipelineConfig::default(), Arc::new(directory))
            .with_encoder_factory(working_encoders());
        let (sink, _rx) = BoundedSink::new(64, "voice").unwrap();

        controller.start(SourceRequest::capture(None), sink).unwrap();
        assert!(controller.wait_until_stopped(Duration::from_secs(2)));
        assert!(matches!(
            controller.status().state,
            SessionState::Stopped {
                reason: StopReason::SourceError { .. }
            }
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_start() {
        let config = PipelineConfig {
            channels: 1,
            ..Default::default()
        };
        let controller = controller(config);
        let (sink, _rx) = BoundedSink::new(8, "voice").unwrap();

        let err = controller.start(SourceRequest::beep(), sink).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_list_devices_marks_default() {
        let devices = controller(PipelineConfig::default()).list_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().any(|d| d.name == "Speakers" && d.is_default));
    }
}
