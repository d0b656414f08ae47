//! ConsoNance command-line host.
//!
//! Runs the engine on its own thread, talks to it over the IPC channels,
//! and drains the outbound sink with a stand-in transport.

mod commands;
mod drain;

pub use commands::{get_status, list_devices, start_session, stop_session, wait_for_stop};
pub use drain::{DrainStats, NullTransport};

use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consonance_engine::create_engine;
use consonance_ipc::{
    command_channel, event_channel, EngineCommand, EngineEvent, PipelineConfig,
};
use consonance_transport::BoundedSink;

/// Application name shown in version output.
pub const APP_NAME: &str = "ConsoNance";

/// Returns e.g. "ConsoNance v0.1.0".
pub fn version_string() -> String {
    format!("{APP_NAME} v{}", env!("CARGO_PKG_VERSION"))
}

/// Channels shared with command handlers.
pub struct AppState {
    pub command_tx: Sender<EngineCommand>,
    pub event_rx: Mutex<Receiver<EngineEvent>>,
}

/// Initialize logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "consonance=info,consonance_engine=info,consonance_audio=info,consonance_encoder=info,consonance_transport=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A running engine plus the transport draining its sink.
pub struct App {
    pub state: AppState,
    engine_thread: Option<JoinHandle<()>>,
    transport: NullTransport,
}

impl App {
    /// Start the engine and transport threads.
    pub fn launch(config: PipelineConfig) -> anyhow::Result<Self> {
        let (sink, receiver) = BoundedSink::new(config.sink_capacity, "null-transport")
            .context("Failed to create outbound sink")?;
        let transport = NullTransport::spawn(receiver, config.frame_duration())?;

        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();

        let engine_thread = thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || {
                info!("Engine thread starting");
                let mut engine = create_engine(command_rx, event_tx, config, sink);
                engine.run();
                info!("Engine thread stopped");
            })
            .context("Failed to spawn engine thread")?;

        Ok(Self {
            state: AppState {
                command_tx,
                event_rx: Mutex::new(event_rx),
            },
            engine_thread: Some(engine_thread),
            transport,
        })
    }

    /// Shut the engine down and return what the transport consumed.
    pub fn shutdown(mut self) -> DrainStats {
        if self.state.command_tx.send(EngineCommand::Shutdown).is_err() {
            warn!("Engine already gone");
        }
        if let Some(handle) = self.engine_thread.take() {
            if handle.join().is_err() {
                warn!("Engine thread panicked");
            }
        }
        self.transport.stop()
    }
}
