//! Commands sent from the host to the engine.

use serde::{Deserialize, Serialize};

use crate::types::SourceRequest;

/// Commands that a host can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Start a session, replacing any session already streaming.
    Start { source: SourceRequest },

    /// Stop the current session.
    Stop,

    /// Request the current session status.
    GetStatus,

    /// Request the list of playback devices available for loopback.
    ListDevices,

    /// Shutdown the engine completely.
    Shutdown,
}
