//! Typed host<->engine messages for the ConsoNance audio pipeline.
//!
//! This crate defines the configuration, session state and message types
//! shared between the engine core and whatever host drives it (the CLI,
//! a chat bot front-end, tests).

mod commands;
mod config;
mod events;
mod state;
mod types;

pub use commands::EngineCommand;
pub use config::{ConfigError, PipelineConfig, DEFAULT_SINK_CAPACITY};
pub use events::EngineEvent;
pub use state::{SessionState, StartupPhase, StopReason};
pub use types::{AudioDevice, SessionMetrics, SessionStatus, SourceRequest};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (host → Engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (Engine → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<EngineCommand>, Receiver<EngineCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
