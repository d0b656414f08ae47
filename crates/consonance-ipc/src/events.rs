//! Events sent from the engine to the host.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::types::{AudioDevice, SessionStatus};

/// Events that the engine can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<SessionState>,

        /// Current state.
        current: Box<SessionState>,
    },

    /// A session was started.
    SessionStarted {
        /// Identifier of the new session.
        session_id: u64,
    },

    /// Current session status.
    Status(Box<SessionStatus>),

    /// Error occurred.
    Error {
        /// Whether the error is recoverable.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// List of playback devices.
    Devices(Vec<AudioDevice>),

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
