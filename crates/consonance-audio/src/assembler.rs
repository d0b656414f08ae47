//! Reassembly of arbitrary sample chunks into fixed-size frames.

use crate::error::AudioError;
use crate::AudioResult;

/// Accumulates interleaved samples and emits complete frames in order.
///
/// Samples are never dropped, duplicated or reordered. Whatever does not
/// fill a whole frame waits in the pending buffer for the next chunk.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    pending: Vec<i16>,
}

impl FrameAssembler {
    /// Create an assembler for frames of `frame_len` interleaved samples.
    pub fn new(frame_len: usize) -> AudioResult<Self> {
        if frame_len == 0 {
            return Err(AudioError::InvalidConfig(
                "frame length must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
        })
    }

    /// Append `chunk` and hand every completed frame to `emit`, oldest first.
    ///
    /// Returns the number of frames emitted. Frames lying wholly inside
    /// `chunk` are passed straight through without copying.
    pub fn push<F>(&mut self, chunk: &[i16], mut emit: F) -> usize
    where
        F: FnMut(&[i16]),
    {
        let mut chunk = chunk;
        let mut emitted = 0;

        if !self.pending.is_empty() {
            let needed = self.frame_len - self.pending.len();
            if chunk.len() < needed {
                self.pending.extend_from_slice(chunk);
                return 0;
            }

            let (head, rest) = chunk.split_at(needed);
            self.pending.extend_from_slice(head);
            emit(&self.pending);
            self.pending.clear();
            emitted += 1;
            chunk = rest;
        }

        let mut frames = chunk.chunks_exact(self.frame_len);
        for frame in frames.by_ref() {
            emit(frame);
            emitted += 1;
        }
        self.pending.extend_from_slice(frames.remainder());

        emitted
    }

    /// Samples waiting for the rest of their frame.
    pub fn pending(&self) -> &[i16] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Discard the partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consonance_ipc::PipelineConfig;
    use proptest::prelude::*;

    fn ramp(start: usize, len: usize) -> Vec<i16> {
        (start..start + len).map(|i| (i % 30_000) as i16).collect()
    }

    #[test]
    fn test_zero_frame_length_rejected() {
        assert!(matches!(
            FrameAssembler::new(0),
            Err(AudioError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_chunks_500_500_920_yield_one_frame() {
        let frame_len = PipelineConfig::default().samples_per_frame();
        let mut assembler = FrameAssembler::new(frame_len).unwrap();
        let mut frames: Vec<Vec<i16>> = Vec::new();

        let first = ramp(0, 500);
        let second = ramp(500, 500);
        let third = ramp(1000, 920);

        assert_eq!(assembler.push(&first, |f| frames.push(f.to_vec())), 0);
        assert_eq!(assembler.pending_len(), 500);
        assert_eq!(assembler.push(&second, |f| frames.push(f.to_vec())), 0);
        assert_eq!(assembler.pending_len(), 1000);
        assert_eq!(assembler.push(&third, |f| frames.push(f.to_vec())), 1);
        assert_eq!(assembler.pending_len(), 0);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], ramp(0, frame_len));
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut assembler = FrameAssembler::new(4).unwrap();
        assert_eq!(assembler.push(&[], |_| panic!("no frame expected")), 0);
        assembler.push(&[1, 2], |_| panic!("no frame expected"));
        assert_eq!(assembler.push(&[], |_| panic!("no frame expected")), 0);
        assert_eq!(assembler.pending(), &[1, 2]);
    }

    #[test]
    fn test_large_chunk_emits_several_frames_in_order() {
        let mut assembler = FrameAssembler::new(4).unwrap();
        let mut frames = Vec::new();
        assembler.push(&[1], |f| frames.push(f.to_vec()));
        let emitted = assembler.push(&[2, 3, 4, 5, 6, 7, 8, 9, 10, 11], |f| {
            frames.push(f.to_vec())
        });

        assert_eq!(emitted, 2);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(assembler.pending(), &[9, 10, 11]);
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut assembler = FrameAssembler::new(4).unwrap();
        assembler.push(&[1, 2, 3], |_| {});
        assembler.clear();
        assert_eq!(assembler.pending_len(), 0);

        let mut frames = Vec::new();
        assembler.push(&[5, 6, 7, 8], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![5, 6, 7, 8]]);
    }

    proptest! {
        #[test]
        fn test_emitted_frames_plus_pending_equal_input(
            frame_len in 1usize..64,
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<i16>(), 0..200),
                0..20,
            ),
        ) {
            let mut assembler = FrameAssembler::new(frame_len).unwrap();
            let mut output = Vec::new();
            let mut frame_count = 0;

            for chunk in &chunks {
                assembler.push(chunk, |frame| {
                    assert_eq!(frame.len(), frame_len);
                    output.extend_from_slice(frame);
                    frame_count += 1;
                });
                prop_assert!(assembler.pending_len() < frame_len);
            }
            output.extend_from_slice(assembler.pending());

            let input: Vec<i16> = chunks.concat();
            prop_assert_eq!(frame_count, input.len() / frame_len);
            prop_assert_eq!(output, input);
        }
    }
}
