//! Per-session pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use consonance_ipc::SessionMetrics;

/// Lock-free counters shared between the source thread and status readers.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    samples_captured: AtomicU64,
    frames_produced: AtomicU64,
    frames_encoded: AtomicU64,
    frames_sent: AtomicU64,
    sink_drops: AtomicU64,
    encode_failures: AtomicU64,
    bytes_sent: AtomicU64,
}

impl PipelineMetrics {
    /// Create a new set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record raw samples delivered by the source.
    pub fn record_samples(&self, count: usize) {
        self.samples_captured
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a complete PCM frame reaching the encoder.
    pub fn record_frame_produced(&self) {
        self.frames_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully encoded frame.
    pub fn record_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame accepted by the sink.
    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a frame discarded by a full sink.
    pub fn record_sink_drop(&self) {
        self.sink_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an encoder failure. Returns the running total.
    pub fn record_encode_failure(&self) -> u64 {
        self.encode_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SessionMetrics {
        SessionMetrics {
            samples_captured: self.samples_captured.load(Ordering::Relaxed),
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            sink_drops: self.sink_drops.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}
