//! One run of the source -> encode -> sink pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use consonance_audio::{ChunkSource, PacingOutcome, PacingSource, StopToken};
use consonance_ipc::{SessionState, SessionStatus, SourceRequest, StopReason};
use consonance_transport::FrameSink;

use crate::metrics::PipelineMetrics;
use crate::pipeline::{FaultSlot, FramePipeline};
use crate::EngineResult;

/// How often a capture session logs its counters.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// The observable side of a session, shared with status readers.
///
/// Every lock here is held only for the duration of a read or a single
/// state write.
pub(crate) struct SessionView {
    id: u64,
    source: SourceRequest,
    sink_label: String,
    device: RwLock<Option<String>>,
    state: RwLock<SessionState>,
    degraded: AtomicBool,
    streaming_since: RwLock<Option<Instant>>,
    metrics: Arc<PipelineMetrics>,
    finished: StopToken,
}

impl SessionView {
    pub(crate) fn new(id: u64, source: SourceRequest, sink_label: String) -> Self {
        Self {
            id,
            source,
            sink_label,
            device: RwLock::new(None),
            state: RwLock::new(SessionState::Idle),
            degraded: AtomicBool::new(false),
            streaming_since: RwLock::new(None),
            metrics: Arc::new(PipelineMetrics::new()),
            finished: StopToken::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub(crate) fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub(crate) fn set_device(&self, name: String) {
        *self.device.write() = Some(name);
    }

    pub(crate) fn set_state(&self, new_state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), new_state.clone());
        debug!(
            session = self.id,
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );
    }

    pub(crate) fn mark_streaming(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
        *self.streaming_since.write() = Some(Instant::now());
        self.set_state(SessionState::Streaming { degraded });
    }

    /// Move Streaming -> Stopping. Returns false if the session was not
    /// streaming, in which case nothing changes.
    pub(crate) fn begin_stopping(&self, reason: StopReason) -> bool {
        let previous = {
            let mut state = self.state.write();
            if !state.is_streaming() {
                return false;
            }
            std::mem::replace(
                &mut *state,
                SessionState::Stopping {
                    reason: reason.clone(),
                },
            )
        };
        debug!(
            session = self.id,
            previous = %previous.name(),
            reason = %reason.message(),
            "State transition to Stopping"
        );
        true
    }

    /// Move Stopping -> Stopped once resources are released.
    pub(crate) fn finish(&self) {
        let reason = match &*self.state.read() {
            SessionState::Stopping { reason } => reason.clone(),
            _ => StopReason::UserRequested,
        };
        self.fail(reason);
    }

    /// Jump straight to Stopped, e.g. when startup fails.
    pub(crate) fn fail(&self, reason: StopReason) {
        self.set_state(SessionState::Stopped { reason });
        self.finished.signal();
    }

    /// Wait until the session reaches Stopped.
    pub(crate) fn wait_finished(&self, timeout: Duration) -> bool {
        self.finished.wait_timeout(timeout)
    }

    pub(crate) fn status(&self) -> SessionStatus {
        let state = self.state();
        let uptime_ms = if state.is_streaming() {
            self.streaming_since
                .read()
                .map(|since| since.elapsed().as_millis() as u64)
                .unwrap_or(0)
        } else {
            0
        };

        SessionStatus {
            state,
            session_id: Some(self.id),
            source: Some(self.source.clone()),
            device: self.device.read().clone(),
            sink: Some(self.sink_label.clone()),
            degraded: self.degraded.load(Ordering::SeqCst),
            metrics: self.metrics.snapshot(),
            uptime_ms,
        }
    }
}

/// Handle on a running session's worker.
pub(crate) struct Session {
    view: Arc<SessionView>,
    stop: StopToken,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Run a paced tone on its own thread. The view must already be Streaming.
    pub(crate) fn spawn_tone(
        view: Arc<SessionView>,
        pacing: PacingSource,
        pipeline: FramePipeline,
        sink: Arc<dyn FrameSink>,
    ) -> EngineResult<Self> {
        let stop = StopToken::new();
        let worker_view = Arc::clone(&view);
        let worker_stop = stop.clone();

        let worker = thread::Builder::new()
            .name(format!("session-{}-tone", view.id()))
            .spawn(move || tone_worker(worker_view, worker_stop, pacing, pipeline, sink))?;

        Ok(Self {
            view,
            stop,
            worker: Some(worker),
        })
    }

    /// Supervise a started capture source. The view must already be Streaming.
    pub(crate) fn spawn_capture(
        view: Arc<SessionView>,
        source: Box<dyn ChunkSource>,
        fault: FaultSlot,
        sink: Arc<dyn FrameSink>,
        poll_interval: Duration,
    ) -> EngineResult<Self> {
        let stop = StopToken::new();
        let worker_view = Arc::clone(&view);
        let worker_stop = stop.clone();

        let worker = thread::Builder::new()
            .name(format!("session-{}-capture", view.id()))
            .spawn(move || {
                capture_supervisor(worker_view, worker_stop, source, fault, sink, poll_interval)
            })?;

        Ok(Self {
            view,
            stop,
            worker: Some(worker),
        })
    }

    pub(crate) fn view(&self) -> &Arc<SessionView> {
        &self.view
    }

    /// Deliver the stop signal if the session is streaming.
    pub(crate) fn request_stop(&self, reason: StopReason) -> bool {
        if self.view.begin_stopping(reason) {
            self.stop.signal();
            true
        } else {
            false
        }
    }

    /// Wait for the worker to release everything and exit.
    pub(crate) fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(session = self.view.id(), "Session worker panicked");
                self.view.fail(StopReason::SourceError {
                    message: "session worker panicked".to_string(),
                });
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.request_stop(StopReason::Shutdown);
        self.join();
    }
}

fn tone_worker(
    view: Arc<SessionView>,
    stop: StopToken,
    mut pacing: PacingSource,
    mut pipeline: FramePipeline,
    sink: Arc<dyn FrameSink>,
) {
    info!(session = view.id(), frames = pacing.frame_count(), "Tone streaming");

    let outcome = pacing.run(&stop, |frame| pipeline.push_frame(frame));
    let reason = match outcome {
        PacingOutcome::Completed { .. } => Some(StopReason::SourceExhausted),
        PacingOutcome::Cancelled { .. } => None,
        PacingOutcome::Aborted { .. } => Some(StopReason::EncoderError {
            message: pipeline
                .fault()
                .get()
                .cloned()
                .unwrap_or_else(|| "encoder aborted".to_string()),
        }),
    };
    if let Some(reason) = reason {
        view.begin_stopping(reason);
    }

    drop(pipeline);
    sink.set_speaking(false);
    view.finish();

    let metrics = view.metrics().snapshot();
    info!(
        session = view.id(),
        frames = outcome.frames(),
        sent = metrics.frames_sent,
        drops = metrics.sink_drops,
        "Tone session ended"
    );
}

fn capture_supervisor(
    view: Arc<SessionView>,
    stop: StopToken,
    mut source: Box<dyn ChunkSource>,
    fault: FaultSlot,
    sink: Arc<dyn FrameSink>,
    poll_interval: Duration,
) {
    info!(session = view.id(), source = %source.description(), "Capture streaming");

    let mut last_report = Instant::now();
    let mut last_drops = 0;

    let reason = loop {
        if stop.wait_timeout(poll_interval) {
            break None;
        }
        if let Some(err) = source.take_error() {
            warn!(session = view.id(), "Capture source failed: {}", err);
            break Some(StopReason::SourceError {
                message: err.to_string(),
            });
        }
        if let Some(message) = fault.get() {
            break Some(StopReason::EncoderError {
                message: message.clone(),
            });
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let metrics = view.metrics().snapshot();
            info!(
                session = view.id(),
                produced = metrics.frames_produced,
                sent = metrics.frames_sent,
                drops = metrics.sink_drops,
                encode_failures = metrics.encode_failures,
                "Stream stats"
            );
            let burst = metrics.sink_drops - last_drops;
            if burst > 0 {
                warn!(
                    session = view.id(),
                    dropped = burst,
                    "Sink full, frames dropped since last report"
                );
            }
            last_drops = metrics.sink_drops;
            last_report = Instant::now();
        }
    };
    if let Some(reason) = reason {
        view.begin_stopping(reason);
    }

    source.stop();
    drop(source);
    sink.set_speaking(false);
    view.finish();

    info!(session = view.id(), "Capture session ended");
}
