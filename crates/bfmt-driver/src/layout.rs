//! Static partitioning of a payload across workers
//!
//! The payload is split into `worker_count` equal, block-aligned ranges
//! starting at offset 0. Whatever does not fit (always less than
//! `8 * (worker_count + 1)` bytes) is the remainder, processed by the
//! initiating thread. Each worker range is further cut into frames so a
//! worker never buffers more than the configured threshold.
//!
//! ```text
//! 0        bs        2bs   ...   W*bs            trailer_offset   total
//! |worker 0|worker 1 | ... |      | remainder blocks |  tail (0..7) |
//! ```

use std::ops::Range;

use bfmt_core::{BfmtError, BfmtResult, BLOCK_LEN};

const BLOCK: u64 = BLOCK_LEN as u64;

/// Byte layout of one run. Computed once before any thread starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLayout {
    /// Payload length: the plaintext on encrypt, the ciphertext minus its
    /// trailer on decrypt
    pub total_length: u64,
    pub worker_count: usize,
    /// Bytes owned by each worker (multiple of 8)
    pub block_size: u64,
    /// Bytes per read/transform/write round trip inside a worker
    pub frame_size: u64,
    pub remainder_offset: u64,
    pub remainder_length: u64,
    /// Padding bytes the encrypt trailer carries (1..=8)
    pub padding_length: u8,
}

/// One contiguous span handled in a single read/transform/write pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub offset: u64,
    pub length: usize,
}

impl FileLayout {
    /// Partition `total_length` bytes across `worker_count` workers.
    ///
    /// Fails rather than adjusting anything: a worker count that leaves
    /// workers without a single block is `InputTooShort` for that count.
    /// See [`clamp_workers`] for the driver's policy.
    pub fn plan(total_length: u64, worker_count: usize, frame_threshold: u64) -> BfmtResult<Self> {
        if worker_count == 0 {
            return Err(BfmtError::InvalidWorkerCount(worker_count));
        }
        if frame_threshold == 0 || frame_threshold % BLOCK != 0 {
            return Err(BfmtError::InvalidFrameThreshold(frame_threshold));
        }
        if total_length < BLOCK {
            return Err(BfmtError::InputTooShort {
                length: total_length,
                minimum: BLOCK,
            });
        }

        let workers = worker_count as u64;
        let block_size = total_length / workers / BLOCK * BLOCK;
        if block_size == 0 {
            return Err(BfmtError::InputTooShort {
                length: total_length,
                minimum: BLOCK * workers,
            });
        }

        let remainder_offset = block_size * workers;
        Ok(Self {
            total_length,
            worker_count,
            block_size,
            frame_size: frame_size_for(block_size, frame_threshold),
            remainder_offset,
            remainder_length: total_length - remainder_offset,
            padding_length: (BLOCK - total_length % BLOCK) as u8,
        })
    }

    /// Byte range owned by worker `index`
    pub fn worker_range(&self, index: usize) -> Range<u64> {
        let start = index as u64 * self.block_size;
        start..start + self.block_size
    }

    /// Frames of worker `index`, in file order. All but the last are
    /// exactly `frame_size` bytes.
    pub fn frames(&self, index: usize) -> impl Iterator<Item = Frame> {
        let range = self.worker_range(index);
        let frame_size = self.frame_size;
        (range.start..range.end)
            .step_by(frame_size as usize)
            .map(move |offset| Frame {
                offset,
                length: frame_size.min(range.end - offset) as usize,
            })
    }

    /// Offsets of the whole blocks in the remainder span
    pub fn remainder_blocks(&self) -> impl Iterator<Item = u64> {
        (self.remainder_offset..self.trailer_offset()).step_by(BLOCK_LEN)
    }

    /// Where the padded trailer block starts
    pub fn trailer_offset(&self) -> u64 {
        self.remainder_offset + self.remainder_length / BLOCK * BLOCK
    }

    /// Real payload bytes that share the trailer block with the padding
    pub fn tail_length(&self) -> usize {
        (self.total_length % BLOCK) as usize
    }
}

/// Worker count the driver actually uses for `total_length` payload bytes:
/// never more workers than whole blocks, never fewer than one.
pub fn clamp_workers(total_length: u64, requested: usize) -> usize {
    let blocks = usize::try_from(total_length / BLOCK).unwrap_or(usize::MAX);
    requested.min(blocks.max(1)).max(1)
}

/// Smallest number of near-equal frames, each a block multiple no larger
/// than `threshold`.
fn frame_size_for(block_size: u64, threshold: u64) -> u64 {
    if block_size <= threshold {
        return block_size;
    }
    let frames = block_size.div_ceil(threshold);
    block_size.div_ceil(frames).next_multiple_of(BLOCK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn single_block_single_worker() {
        let layout = FileLayout::plan(8, 1, MIB).unwrap();
        assert_eq!(layout.block_size, 8);
        assert_eq!(layout.frame_size, 8);
        assert_eq!(layout.remainder_length, 0);
        assert_eq!(layout.padding_length, 8);
        assert_eq!(layout.trailer_offset(), 8);
        assert_eq!(layout.tail_length(), 0);
        assert_eq!(layout.remainder_blocks().count(), 0);
    }

    #[test]
    fn fifteen_bytes_two_workers_is_too_short() {
        // 15 / 2 = 7, which floors to a zero-byte block
        let result = FileLayout::plan(15, 2, MIB);
        assert!(matches!(
            result,
            Err(BfmtError::InputTooShort {
                length: 15,
                minimum: 16
            })
        ));

        let workers = clamp_workers(15, 2);
        assert_eq!(workers, 1);
        let layout = FileLayout::plan(15, workers, MIB).unwrap();
        assert_eq!(layout.block_size, 8);
        assert_eq!(layout.remainder_length, 7);
        assert_eq!(layout.padding_length, 1);
        assert_eq!(layout.trailer_offset(), 8);
        assert_eq!(layout.tail_length(), 7);
    }

    #[test]
    fn remainder_has_whole_blocks_and_tail() {
        // 100 / 3 = 33 → 32 per worker, 4 left over
        let layout = FileLayout::plan(100, 3, MIB).unwrap();
        assert_eq!(layout.block_size, 32);
        assert_eq!(layout.remainder_offset, 96);
        assert_eq!(layout.remainder_length, 4);
        assert_eq!(layout.trailer_offset(), 96);
        assert_eq!(layout.padding_length, 4);

        // 200 / 3 = 66 → 64 per worker, 8 left: one whole remainder block
        let layout = FileLayout::plan(200, 3, MIB).unwrap();
        assert_eq!(layout.block_size, 64);
        assert_eq!(layout.remainder_length, 8);
        assert_eq!(layout.remainder_blocks().collect::<Vec<_>>(), vec![192]);
        assert_eq!(layout.trailer_offset(), 200);
        assert_eq!(layout.padding_length, 8);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            FileLayout::plan(64, 0, MIB),
            Err(BfmtError::InvalidWorkerCount(0))
        ));
        assert!(matches!(
            FileLayout::plan(7, 1, MIB),
            Err(BfmtError::InputTooShort { length: 7, .. })
        ));
        assert!(matches!(
            FileLayout::plan(64, 1, 12),
            Err(BfmtError::InvalidFrameThreshold(12))
        ));
    }

    #[test]
    fn block_under_threshold_is_one_frame() {
        let layout = FileLayout::plan(4096, 2, MIB).unwrap();
        assert_eq!(layout.frame_size, 2048);
        let frames: Vec<_> = layout.frames(1).collect();
        assert_eq!(
            frames,
            vec![Frame {
                offset: 2048,
                length: 2048
            }]
        );
    }

    #[test]
    fn oversized_block_is_split_evenly() {
        let layout = FileLayout::plan(1024, 1, 1000).unwrap();
        assert_eq!(layout.frame_size, 512);
        assert_eq!(layout.frames(0).count(), 2);
    }

    #[test]
    fn uneven_split_leaves_short_last_frame() {
        // 1000 bytes under a 64-byte cap: 16 frames of 64, the last one 40
        let layout = FileLayout::plan(1000, 1, 64).unwrap();
        assert_eq!(layout.frame_size, 64);
        let frames: Vec<_> = layout.frames(0).collect();
        assert_eq!(frames.len(), 16);
        assert_eq!(frames.last().unwrap().offset, 960);
        assert_eq!(frames.last().unwrap().length, 40);
    }

    #[test]
    fn clamp_policy() {
        assert_eq!(clamp_workers(8, 4), 1);
        assert_eq!(clamp_workers(64, 4), 4);
        assert_eq!(clamp_workers(64, 16), 8);
        assert_eq!(clamp_workers(3, 2), 1);
        assert_eq!(clamp_workers(1 << 30, 0), 1);
    }

    proptest! {
        #[test]
        fn partition_invariant(total in 8u64..200_000, workers in 1usize..=64) {
            prop_assume!(workers as u64 <= total / 8);
            let layout = FileLayout::plan(total, workers, 4096).unwrap();
            let w = workers as u64;

            prop_assert_eq!(layout.block_size % 8, 0);
            prop_assert!(layout.block_size * w <= total);
            prop_assert!(total < layout.block_size * w + 8 * (w + 1));
            prop_assert_eq!(layout.block_size * w + layout.remainder_length, total);
            prop_assert!((1..=8).contains(&layout.padding_length));
            prop_assert_eq!(
                layout.trailer_offset() + layout.tail_length() as u64,
                total
            );
        }

        /// Frames tile each worker range exactly and respect the threshold
        #[test]
        fn frames_cover_worker_range(
            total in 8u64..100_000,
            workers in 1usize..=8,
            threshold_blocks in 1u64..=64,
        ) {
            prop_assume!(workers as u64 <= total / 8);
            let threshold = threshold_blocks * 8;
            let layout = FileLayout::plan(total, workers, threshold).unwrap();

            prop_assert!(layout.frame_size <= threshold);
            prop_assert_eq!(layout.frame_size % 8, 0);
            for i in 0..workers {
                let range = layout.worker_range(i);
                let mut expected = range.start;
                for frame in layout.frames(i) {
                    prop_assert_eq!(frame.offset, expected, "frames must be contiguous");
                    prop_assert_eq!(frame.length % 8, 0);
                    expected += frame.length as u64;
                }
                prop_assert_eq!(expected, range.end);
            }
        }
    }
}
