//! Outbound frame sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, trace};

use consonance_encoder::EncodedFrame;

use crate::error::TransportError;
use crate::TransportResult;

/// Destination for encoded frames.
///
/// Implementations must never block in [`try_push`](FrameSink::try_push).
pub trait FrameSink: Send + Sync {
    /// Enqueue a frame. Returns false if it was dropped.
    fn try_push(&self, frame: EncodedFrame) -> bool;

    /// Whether the consumer is ready to receive frames.
    fn is_ready(&self) -> bool {
        true
    }

    /// Flag the outbound stream as carrying audio (or not).
    fn set_speaking(&self, _speaking: bool) {}

    /// Frames currently queued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum frames the sink queues.
    fn capacity(&self) -> usize;

    /// Name for logs and status.
    fn label(&self) -> &str;
}

/// Point-in-time sink counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub pushed: u64,
    pub dropped: u64,
    pub queued: usize,
    pub capacity: usize,
}

/// Fixed-capacity FIFO of encoded frames backed by a bounded channel.
pub struct BoundedSink {
    label: String,
    tx: Sender<EncodedFrame>,
    capacity: usize,
    ready: AtomicBool,
    speaking: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl BoundedSink {
    /// Create a sink that is ready immediately.
    pub fn new(
        capacity: usize,
        label: impl Into<String>,
    ) -> TransportResult<(Arc<Self>, SinkReceiver)> {
        Self::build(capacity, label.into(), true)
    }

    /// Create a sink that reports not-ready until [`mark_ready`](Self::mark_ready).
    pub fn new_pending(
        capacity: usize,
        label: impl Into<String>,
    ) -> TransportResult<(Arc<Self>, SinkReceiver)> {
        Self::build(capacity, label.into(), false)
    }

    fn build(
        capacity: usize,
        label: String,
        ready: bool,
    ) -> TransportResult<(Arc<Self>, SinkReceiver)> {
        if capacity == 0 {
            return Err(TransportError::InvalidCapacity(capacity));
        }

        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let sink = Arc::new(Self {
            label: label.clone(),
            tx,
            capacity,
            ready: AtomicBool::new(ready),
            speaking: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        debug!(sink = %label, capacity, "Sink created");
        Ok((sink, SinkReceiver { rx, label }))
    }

    /// Report the consumer as ready.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queued: self.tx.len(),
            capacity: self.capacity,
        }
    }

    fn record_drop(&self, sequence: u64, disconnected: bool) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(sink = %self.label, sequence, disconnected, "Frame dropped");
        if dropped == 1 || dropped % 100 == 0 {
            debug!(sink = %self.label, dropped, "Sink dropping frames");
        }
    }
}

impl FrameSink for BoundedSink {
    fn try_push(&self, frame: EncodedFrame) -> bool {
        let sequence = frame.sequence;
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.record_drop(sequence, false);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.record_drop(sequence, true);
                false
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_speaking(&self, speaking: bool) {
        let previous = self.speaking.swap(speaking, Ordering::SeqCst);
        if previous != speaking {
            debug!(sink = %self.label, speaking, "Speaking state changed");
        }
    }

    fn len(&self) -> usize {
        self.tx.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Consumer end of a [`BoundedSink`], drained by the transport.
pub struct SinkReceiver {
    rx: Receiver<EncodedFrame>,
    label: String,
}

impl SinkReceiver {
    /// Take the oldest frame without waiting.
    pub fn try_recv(&self) -> Option<EncodedFrame> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a frame. `Ok(None)` means the wait timed out.
    pub fn recv_timeout(&self, timeout: Duration) -> TransportResult<Option<EncodedFrame>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ChannelDisconnected),
        }
    }

    /// Take every queued frame, oldest first.
    pub fn drain(&self) -> Vec<EncodedFrame> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Instant;

    fn frame(sequence: u64) -> EncodedFrame {
        EncodedFrame {
            data: Bytes::from_static(&[0xfc, 0xff, 0xfe]),
            sequence,
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedSink::new(0, "test"),
            Err(TransportError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_full_sink_drops_without_changing_length() {
        let (sink, _rx) = BoundedSink::new(2, "test").unwrap();
        assert!(sink.try_push(frame(0)));
        assert!(sink.try_push(frame(1)));
        assert_eq!(sink.len(), 2);

        let started = Instant::now();
        assert!(!sink.try_push(frame(2)));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(sink.len(), 2);

        let stats = sink.stats();
        assert_eq!(stats.pushed, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.queued, 2);
    }

    #[test]
    fn test_frames_drain_in_order() {
        let (sink, rx) = BoundedSink::new(4, "test").unwrap();
        for sequence in 0..3 {
            assert!(sink.try_push(frame(sequence)));
        }
        let drained: Vec<u64> = rx.drain().into_iter().map(|f| f.sequence).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_dropped_receiver_counts_as_drop() {
        let (sink, rx) = BoundedSink::new(4, "test").unwrap();
        drop(rx);
        assert!(!sink.try_push(frame(0)));
        assert_eq!(sink.stats().dropped, 1);
    }

    #[test]
    fn test_recv_timeout_and_disconnect() {
        let (sink, rx) = BoundedSink::new(1, "test").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(5)).unwrap().is_none());

        sink.try_push(frame(7));
        let received = rx.recv_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(received.map(|f| f.sequence), Some(7));

        drop(sink);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(5)),
            Err(TransportError::ChannelDisconnected)
        ));
    }

    #[test]
    fn test_readiness_and_speaking() {
        let (sink, _rx) = BoundedSink::new_pending(1, "voice").unwrap();
        assert!(!sink.is_ready());
        sink.mark_ready();
        assert!(sink.is_ready());

        assert!(!sink.is_speaking());
        sink.set_speaking(true);
        assert!(sink.is_speaking());
        assert_eq!(sink.label(), "voice");
    }
}
