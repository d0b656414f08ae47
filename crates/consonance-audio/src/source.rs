//! The callback-driven source seam.

use crate::error::AudioError;
use crate::AudioResult;

/// Callback receiving raw interleaved sample chunks of arbitrary length.
///
/// Runs on the audio subsystem's thread and must return quickly: no
/// sleeping, waiting or blocking I/O.
pub type ChunkCallback = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// A source that pushes sample chunks at a cadence it controls.
pub trait ChunkSource: Send {
    /// Start delivering chunks to `on_chunk`.
    ///
    /// Failures to open or start the underlying stream are returned here,
    /// before any chunk is delivered.
    fn start(&mut self, on_chunk: ChunkCallback) -> AudioResult<()>;

    /// Stop delivering chunks and release the stream. Idempotent.
    fn stop(&mut self);

    /// Take the oldest runtime error reported by the stream, if any.
    fn take_error(&mut self) -> Option<AudioError>;

    /// Returns true between a successful start and stop.
    fn is_running(&self) -> bool;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}
