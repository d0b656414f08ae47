//! Bounded, drop-on-full outbound frame sink.
//!
//! The sink is the only meeting point between the real-time source thread
//! and the network transport. Pushing never blocks: when the queue is full
//! the newest frame is discarded and counted.

mod error;
mod sink;

pub use error::TransportError;
pub use sink::{BoundedSink, FrameSink, SinkReceiver, SinkStats};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
