//! Fixed worker pool: one scoped OS thread per partition, spawned once and
//! joined once. No queue and no stealing; the layout decides everything.

use std::thread::{Builder, Scope, ScopedJoinHandle};

use bfmt_cipher::BlockCipher;
use bfmt_core::{BfmtError, BfmtResult};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::context::RunContext;

pub struct WorkerPool<'scope> {
    handles: Vec<ScopedJoinHandle<'scope, BfmtResult<()>>>,
}

impl<'scope> WorkerPool<'scope> {
    /// Start one worker per partition of `ctx.layout`.
    ///
    /// If the OS refuses a thread, the workers already running are told to
    /// stop and joined before the error is returned.
    pub fn spawn<'env, C>(
        scope: &'scope Scope<'scope, 'env>,
        ctx: &'env RunContext<'_, C>,
    ) -> BfmtResult<Self>
    where
        C: BlockCipher + Sync + ?Sized,
    {
        let count = ctx.layout.worker_count;
        let mut pool = Self {
            handles: Vec::with_capacity(count),
        };

        for index in 0..count {
            let spawned = Builder::new()
                .name(format!("bfmt-worker-{index}"))
                .spawn_scoped(scope, move || run_worker(ctx, index));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    warn!(worker = index, "thread spawn failed: {e}");
                    ctx.abort();
                    let _ = pool.join();
                    return Err(BfmtError::ThreadSpawn(e));
                }
            }
        }

        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker. Returns the first failure in worker order.
    pub fn join(self) -> BfmtResult<()> {
        let mut first_error = None;
        for (index, handle) in self.handles.into_iter().enumerate() {
            let outcome = handle
                .join()
                .unwrap_or(Err(BfmtError::WorkerPanicked(index)));
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn run_worker<C>(ctx: &RunContext<'_, C>, index: usize) -> BfmtResult<()>
where
    C: BlockCipher + Sync + ?Sized,
{
    let _guard = AbortOnPanic(ctx);
    let range = ctx.layout.worker_range(index);
    debug!(worker = index, start = range.start, end = range.end, "worker starting");

    // Holds plaintext on one side of the transform or the other
    let mut buf = Zeroizing::new(vec![0u8; ctx.layout.frame_size as usize]);
    let mut frames = 0usize;

    for frame in ctx.layout.frames(index) {
        if ctx.is_aborted() {
            debug!(worker = index, frames, "worker stopping early");
            return Ok(());
        }
        if let Err(e) = ctx.process_span(frame.offset, &mut buf[..frame.length]) {
            ctx.abort();
            return Err(e);
        }
        frames += 1;
    }

    debug!(worker = index, frames, "worker finished");
    Ok(())
}

/// Raises the abort flag if the worker unwinds, so a panic stops the other
/// workers as an I/O error does.
struct AbortOnPanic<'c, 'a, C: BlockCipher + Sync + ?Sized>(&'c RunContext<'a, C>);

impl<C: BlockCipher + Sync + ?Sized> Drop for AbortOnPanic<'_, '_, C> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}
