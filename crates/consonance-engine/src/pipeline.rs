//! The per-frame hot path: assemble, encode, enqueue.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use consonance_audio::FrameAssembler;
use consonance_encoder::AudioEncoder;
use consonance_ipc::PipelineConfig;
use consonance_transport::FrameSink;

use crate::metrics::PipelineMetrics;
use crate::EngineResult;

/// Set once when the encoder fails too many times in a row.
pub type FaultSlot = Arc<OnceLock<String>>;

/// Encoder failures are logged on the first and then every Nth occurrence.
const FAILURE_LOG_INTERVAL: u64 = 50;

/// Owns everything a source thread touches per frame.
///
/// Nothing here blocks: the sink push is non-blocking, the counters are
/// atomics and the fault slot is written at most once.
pub struct FramePipeline {
    assembler: FrameAssembler,
    stage: EncodeStage,
}

struct EncodeStage {
    encoder: Box<dyn AudioEncoder>,
    sink: Arc<dyn FrameSink>,
    metrics: Arc<PipelineMetrics>,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    fault: FaultSlot,
}

impl FramePipeline {
    /// Build a pipeline around a session's encoder and sink.
    pub fn new(
        config: &PipelineConfig,
        encoder: Box<dyn AudioEncoder>,
        sink: Arc<dyn FrameSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> EngineResult<Self> {
        let assembler = FrameAssembler::new(config.samples_per_frame())?;

        Ok(Self {
            assembler,
            stage: EncodeStage {
                encoder,
                sink,
                metrics,
                max_consecutive_failures: config.max_consecutive_encode_failures,
                consecutive_failures: 0,
                fault: Arc::new(OnceLock::new()),
            },
        })
    }

    /// Feed an arbitrary-length chunk. Returns false once the pipeline has
    /// faulted; later chunks are ignored.
    pub fn push_chunk(&mut self, chunk: &[i16]) -> bool {
        if self.is_faulted() {
            return false;
        }
        self.stage.metrics.record_samples(chunk.len());

        let stage = &mut self.stage;
        self.assembler.push(chunk, |frame| {
            stage.push_frame(frame);
        });
        !self.is_faulted()
    }

    /// Feed one already-aligned frame, bypassing the assembler.
    pub fn push_frame(&mut self, frame: &[i16]) -> bool {
        if self.is_faulted() {
            return false;
        }
        self.stage.metrics.record_samples(frame.len());
        self.stage.push_frame(frame)
    }

    /// Handle to the fault slot, for a supervisor on another thread.
    pub fn fault(&self) -> FaultSlot {
        Arc::clone(&self.stage.fault)
    }

    pub fn is_faulted(&self) -> bool {
        self.stage.fault.get().is_some()
    }

    /// Samples held back waiting for the rest of a frame.
    pub fn pending_samples(&self) -> usize {
        self.assembler.pending_len()
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        let pending = self.assembler.pending_len();
        if pending > 0 {
            debug!(pending, "Discarding partial frame");
        }
        self.assembler.clear();
    }
}

impl EncodeStage {
    fn push_frame(&mut self, frame: &[i16]) -> bool {
        if self.fault.get().is_some() {
            return false;
        }
        self.metrics.record_frame_produced();

        match self.encoder.encode(frame) {
            Ok(encoded) => {
                self.consecutive_failures = 0;
                self.metrics.record_encoded();
                let bytes = encoded.len();
                if self.sink.try_push(encoded) {
                    self.metrics.record_sent(bytes);
                } else {
                    self.metrics.record_sink_drop();
                }
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let total = self.metrics.record_encode_failure();
                if total == 1 || total % FAILURE_LOG_INTERVAL == 0 {
                    warn!(
                        encoder = self.encoder.name(),
                        total,
                        consecutive = self.consecutive_failures,
                        "Encode failed, dropping frame: {}",
                        e
                    );
                }

                if self.consecutive_failures >= self.max_consecutive_failures {
                    let message = format!(
                        "{} consecutive encode failures, last: {}",
                        self.consecutive_failures, e
                    );
                    warn!("{}", message);
                    let _ = self.fault.set(message);
                    return false;
                }
                true
            }
        }
    }
}
