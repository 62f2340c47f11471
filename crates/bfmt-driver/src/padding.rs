//! Padding trailer: the last 8-byte block of every ciphertext
//!
//! Plaintext of the trailer is the `n % 8` real tail bytes followed by
//! `p = 8 - n % 8` bytes each equal to `p`, so `p` is always in 1..=8 and
//! a block-aligned input gets a full block of `0x08`:
//!
//! ```text
//! tail = [a b c]          → [a b c 05 05 05 05 05]
//! tail = []               → [08 08 08 08 08 08 08 08]
//! ```
//!
//! These steps run only after every worker has been joined.

use bfmt_cipher::BlockCipher;
use bfmt_core::{BfmtError, BfmtResult, Mode, BLOCK_LEN};
use tracing::debug;
use zeroize::Zeroizing;

use crate::context::RunContext;

/// Build the trailer plaintext for `tail`.
///
/// # Panics
/// If `tail` is a whole block or longer; the layout never produces that.
pub fn pad_trailer(tail: &[u8]) -> [u8; BLOCK_LEN] {
    assert!(tail.len() < BLOCK_LEN, "tail must be shorter than a block");
    let pad = (BLOCK_LEN - tail.len()) as u8;
    let mut block = [pad; BLOCK_LEN];
    block[..tail.len()].copy_from_slice(tail);
    block
}

/// Validate a decrypted trailer and return its real bytes.
pub fn unpad_trailer(block: &[u8; BLOCK_LEN]) -> BfmtResult<&[u8]> {
    let pad = block[BLOCK_LEN - 1];
    if !(1..=BLOCK_LEN as u8).contains(&pad) {
        return Err(BfmtError::InvalidPadding(pad));
    }
    let (data, padding) = block.split_at(BLOCK_LEN - pad as usize);
    if padding.iter().any(|&b| b != pad) {
        return Err(BfmtError::InvalidPadding(pad));
    }
    Ok(data)
}

/// Write (encrypt) or strip (decrypt) the trailer and fix the output
/// length. Returns the final output length.
pub fn finish<C>(ctx: &RunContext<'_, C>) -> BfmtResult<u64>
where
    C: BlockCipher + Sync + ?Sized,
{
    match ctx.mode {
        Mode::Encrypt => finish_encrypt(ctx),
        Mode::Decrypt => finish_decrypt(ctx),
    }
}

fn finish_encrypt<C>(ctx: &RunContext<'_, C>) -> BfmtResult<u64>
where
    C: BlockCipher + Sync + ?Sized,
{
    let offset = ctx.layout.trailer_offset();
    let tail_len = ctx.layout.tail_length();

    let mut tail = Zeroizing::new([0u8; BLOCK_LEN]);
    ctx.read_at(offset, &mut tail[..tail_len])?;

    let mut block = Zeroizing::new(pad_trailer(&tail[..tail_len]));
    ctx.cipher.encrypt_block(&mut block);
    ctx.write_at(offset, &block[..])?;

    let output_len = offset + BLOCK_LEN as u64;
    ctx.set_output_len(output_len)?;
    debug!(
        offset,
        padding = ctx.layout.padding_length,
        "trailer written"
    );
    Ok(output_len)
}

fn finish_decrypt<C>(ctx: &RunContext<'_, C>) -> BfmtResult<u64>
where
    C: BlockCipher + Sync + ?Sized,
{
    let offset = ctx.layout.trailer_offset();

    let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
    ctx.read_at(offset, &mut block[..])?;
    ctx.cipher.decrypt_block(&mut block);

    let data = unpad_trailer(&block)?;
    ctx.write_at(offset, data)?;

    let output_len = offset + data.len() as u64;
    ctx.set_output_len(output_len)?;
    debug!(
        offset,
        trimmed = BLOCK_LEN - data.len(),
        "trailer stripped"
    );
    Ok(output_len)
}
