//! Session controller and frame pipeline for ConsoNance.
//!
//! This crate ties sources, the encoder and the outbound sink together
//! into sessions, and enforces that only one session writes to a sink at
//! a time.

mod controller;
mod error;
mod metrics;
mod orchestrator;
mod pipeline;
mod session;
#[cfg(test)]
mod testing;

pub use controller::{EncoderFactory, SessionController};
pub use error::EngineError;
pub use metrics::PipelineMetrics;
pub use orchestrator::Engine;
pub use pipeline::{FaultSlot, FramePipeline};

use std::sync::Arc;

use consonance_audio::CpalDeviceDirectory;
use consonance_ipc::{EngineCommand, EngineEvent, PipelineConfig};
use consonance_transport::FrameSink;
use crossbeam_channel::{Receiver, Sender};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Create an engine over the platform's playback devices.
pub fn create_engine(
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    config: PipelineConfig,
    sink: Arc<dyn FrameSink>,
) -> Engine {
    let controller = SessionController::new(config, Arc::new(CpalDeviceDirectory::new()));
    Engine::new(command_rx, event_tx, controller, sink)
}
