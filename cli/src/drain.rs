//! Stand-in network transport that consumes the sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use consonance_transport::{SinkReceiver, TransportError};

/// Frames and bytes the transport consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub frames: u64,
    pub bytes: u64,
}

/// Pulls encoded frames off the sink and discards them.
pub struct NullTransport {
    should_stop: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl NullTransport {
    /// Start draining `receiver` at one frame per `interval`.
    ///
    /// Frames that arrive faster than that wait in the sink, so a burst
    /// larger than its capacity shows up as sink drops.
    pub fn spawn(receiver: SinkReceiver, interval: Duration) -> std::io::Result<Self> {
        let should_stop = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let bytes = Arc::new(AtomicU64::new(0));

        let thread_stop = Arc::clone(&should_stop);
        let thread_frames = Arc::clone(&frames);
        let thread_bytes = Arc::clone(&bytes);

        let thread = thread::Builder::new()
            .name("null-transport".to_string())
            .spawn(move || {
                let mut next_slot = Instant::now();
                while !thread_stop.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now < next_slot {
                        thread::sleep(next_slot - now);
                        continue;
                    }

                    match receiver.recv_timeout(interval) {
                        Ok(Some(frame)) => {
                            trace!(sequence = frame.sequence, len = frame.len(), "Frame sent");
                            thread_frames.fetch_add(1, Ordering::Relaxed);
                            thread_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
                            // No credit for idle time: at most one frame per slot.
                            next_slot = next_slot.max(Instant::now()) + interval;
                        }
                        Ok(None) => {}
                        Err(TransportError::ChannelDisconnected) => {
                            debug!("Sink closed, transport exiting");
                            break;
                        }
                        Err(e) => {
                            warn!("Transport error: {}", e);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            should_stop,
            frames,
            bytes,
            thread: Some(thread),
        })
    }

    pub fn stats(&self) -> DrainStats {
        DrainStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Stop draining and return the totals.
    pub fn stop(&mut self) -> DrainStats {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.stats()
    }
}

impl Drop for NullTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use consonance_encoder::EncodedFrame;
    use consonance_transport::{BoundedSink, FrameSink};

    fn frame(sequence: u64) -> EncodedFrame {
        EncodedFrame {
            data: Bytes::from_static(&[1, 2, 3]),
            sequence,
        }
    }

    #[test]
    fn test_drains_every_frame() {
        let (sink, receiver) = BoundedSink::new(8, "test").unwrap();
        let mut transport = NullTransport::spawn(receiver, Duration::from_millis(5)).unwrap();

        for sequence in 0..4 {
            assert!(sink.try_push(frame(sequence)));
        }
        std::thread::sleep(Duration::from_millis(100));

        let stats = transport.stop();
        assert_eq!(stats, DrainStats { frames: 4, bytes: 12 });
        assert!(sink.is_empty());
    }

    #[test]
    fn test_burst_beyond_capacity_is_dropped() {
        let interval = Duration::from_millis(20);
        let (sink, receiver) = BoundedSink::new(4, "test").unwrap();
        let mut transport = NullTransport::spawn(receiver, interval).unwrap();

        let accepted = (0..10).filter(|&sequence| sink.try_push(frame(sequence))).count() as u64;
        assert!((4..=5).contains(&accepted), "accepted {accepted}");
        assert_eq!(sink.stats().dropped, 10 - accepted);

        // Paced to one frame per interval, not as fast as frames arrive.
        std::thread::sleep(interval + interval / 2);
        assert!(transport.stats().frames <= 2);

        std::thread::sleep(interval * 8);
        let stats = transport.stop();
        assert_eq!(stats.frames, accepted);
        assert!(sink.is_empty());
    }
}
