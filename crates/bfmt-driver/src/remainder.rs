//! Whole blocks past the last worker range, handled by the thread that
//! launched the pool while the workers run.

use bfmt_cipher::BlockCipher;
use bfmt_core::{BfmtResult, BLOCK_LEN};
use tracing::debug;
use zeroize::Zeroizing;

use crate::context::RunContext;

/// Process the aligned remainder one block at a time under the same
/// locks as the workers. Returns the number of blocks handled.
///
/// The trailer block is left to the padding step.
pub fn process<C>(ctx: &RunContext<'_, C>) -> BfmtResult<u64>
where
    C: BlockCipher + Sync + ?Sized,
{
    let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
    let mut count = 0u64;

    for offset in ctx.layout.remainder_blocks() {
        if ctx.is_aborted() {
            break;
        }
        if let Err(e) = ctx.process_span(offset, &mut block[..]) {
            ctx.abort();
            return Err(e);
        }
        count += 1;
    }

    debug!(blocks = count, offset = ctx.layout.remainder_offset, "remainder done");
    Ok(count)
}
