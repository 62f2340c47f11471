//! Byte-level block interface used by the file driver

use bfmt_core::{Mode, BLOCK_LEN};

/// A 64-bit block cipher applied in place, one block at a time (ECB).
///
/// Implementations must be deterministic and keep no per-call state, so a
/// single instance can be shared by reference across worker threads.
pub trait BlockCipher {
    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]);

    fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]);

    fn apply_block(&self, mode: Mode, block: &mut [u8; BLOCK_LEN]) {
        match mode {
            Mode::Encrypt => self.encrypt_block(block),
            Mode::Decrypt => self.decrypt_block(block),
        }
    }

    /// Transform every whole block of `frame` in place.
    ///
    /// Frame lengths are block multiples everywhere in the driver; a short
    /// tail, if any, is left untouched.
    fn apply_frame(&self, mode: Mode, frame: &mut [u8]) {
        let (blocks, _tail) = frame.as_chunks_mut::<BLOCK_LEN>();
        for block in blocks {
            self.apply_block(mode, block);
        }
    }
}
