//! Common types used across IPC messages.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;

/// Where a session's audio comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceRequest {
    /// A synthetic sine tone, self-paced to real time.
    Tone {
        /// Tone frequency in Hz.
        frequency_hz: f32,

        /// Tone length in seconds.
        duration_secs: f32,

        /// Peak amplitude as a fraction of full scale (0.0 - 1.0).
        amplitude: f32,
    },

    /// Loopback capture of a playback device.
    Capture {
        /// Device name (None uses the configured or default device).
        device: Option<String>,
    },
}

impl SourceRequest {
    /// The one-second 440 Hz test beep.
    pub fn beep() -> Self {
        Self::Tone {
            frequency_hz: 440.0,
            duration_secs: 1.0,
            amplitude: 0.3,
        }
    }

    /// Loopback capture of the given (or default) device.
    pub fn capture(device: Option<String>) -> Self {
        Self::Capture { device }
    }

    /// Returns a short name for the kind of source.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tone { .. } => "tone",
            Self::Capture { .. } => "capture",
        }
    }
}

/// A playback device that can be captured in loopback mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Unique identifier for this device.
    pub id: String,

    /// Display name, matched exactly when selecting a device.
    pub name: String,

    /// Whether this is the default playback device.
    pub is_default: bool,
}

/// Per-session pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Raw samples delivered by the source.
    pub samples_captured: u64,

    /// Complete PCM frames handed to the encoder.
    pub frames_produced: u64,

    /// Frames the encoder turned into packets.
    pub frames_encoded: u64,

    /// Encoded frames accepted by the sink.
    pub frames_sent: u64,

    /// Encoded frames discarded because the sink was full.
    pub sink_drops: u64,

    /// Frames dropped because the encoder failed.
    pub encode_failures: u64,

    /// Encoded bytes accepted by the sink.
    pub bytes_sent: u64,
}

/// Snapshot of the controller's current session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current session state.
    pub state: SessionState,

    /// Identifier of the current (or last) session.
    pub session_id: Option<u64>,

    /// What the session is playing.
    pub source: Option<SourceRequest>,

    /// Capture device name, for capture sessions.
    pub device: Option<String>,

    /// Label of the sink the session writes to.
    pub sink: Option<String>,

    /// The sink never reported ready during startup.
    pub degraded: bool,

    /// Pipeline counters.
    pub metrics: SessionMetrics,

    /// Time since the session started streaming, in milliseconds.
    pub uptime_ms: u64,
}

impl SessionStatus {
    /// Returns true if frames are currently flowing.
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }
}
