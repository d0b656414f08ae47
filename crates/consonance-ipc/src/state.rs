//! Session state machine types.

use serde::{Deserialize, Serialize};

/// The lifecycle state of a pipeline session.
///
/// `Idle -> Starting -> Streaming -> Stopping -> Stopped`, where `Stopped`
/// is terminal for that session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started.
    #[default]
    Idle,

    /// The session is starting up.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Frames are flowing from the source to the sink.
    Streaming {
        /// The sink never reported ready and the session proceeded anyway.
        degraded: bool,
    },

    /// A stop signal was delivered and resources are being released.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,
    },

    /// The session has released all of its resources.
    Stopped {
        /// Reason the session ended.
        reason: StopReason,
    },
}

impl SessionState {
    /// Returns true if no session has been started.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the session is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns true if the session is streaming.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Returns true if the session is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the session has fully stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Returns true if the state can never change again for this session.
    pub fn is_terminal(&self) -> bool {
        self.is_stopped()
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Streaming { .. } => "Streaming",
            Self::Stopping { .. } => "Stopping",
            Self::Stopped { .. } => "Stopped",
        }
    }
}

/// Startup phases for a session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Checking the pipeline configuration.
    ValidateConfig,

    /// Resolving the capture device or preparing the generator.
    ResolveSource,

    /// Creating the session's encoder.
    InitEncoder,

    /// Waiting (bounded) for the sink to report readiness.
    AwaitSinkReady,

    /// Starting the source.
    StartSource,
}

/// Reason a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The host requested stop.
    UserRequested,

    /// A newer session replaced this one.
    Superseded,

    /// A finite source (tone) ran to completion.
    SourceExhausted,

    /// The encoder failed too many times in a row.
    EncoderError { message: String },

    /// The capture source reported an unrecoverable error.
    SourceError { message: String },

    /// Startup failed before the session reached streaming.
    StartFailed { message: String },

    /// The engine is shutting down.
    Shutdown,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Stream stopped by user".to_string(),
            Self::Superseded => "Stream replaced by a new session".to_string(),
            Self::SourceExhausted => "Source finished".to_string(),
            Self::EncoderError { message } => format!("Encoder error: {message}"),
            Self::SourceError { message } => format!("Source error: {message}"),
            Self::StartFailed { message } => format!("Start failed: {message}"),
            Self::Shutdown => "Engine shutting down".to_string(),
        }
    }

}
