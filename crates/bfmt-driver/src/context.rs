//! Shared state of one run, handed to every thread by `&` reference
//!
//! Only the two file handles are mutable, each behind its own mutex because
//! a handle has a single cursor and a seek + read (or seek + write) pair must
//! not interleave with another thread's. The locks guard cursors, not data:
//! byte ranges never overlap between threads.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bfmt_cipher::BlockCipher;
use bfmt_core::{BfmtError, BfmtResult, Mode};

use crate::layout::FileLayout;

/// Receives byte counts as frames and blocks complete.
///
/// Called concurrently from all workers; implementations must be cheap.
pub trait Progress: Sync {
    fn advance(&self, bytes: u64);
}

/// Discards progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

pub struct RunContext<'a, C: ?Sized> {
    pub cipher: &'a C,
    pub mode: Mode,
    pub layout: FileLayout,
    input: Mutex<File>,
    output: Mutex<File>,
    aborted: AtomicBool,
    progress: &'a dyn Progress,
}

impl<'a, C: BlockCipher + Sync + ?Sized> RunContext<'a, C> {
    pub fn new(
        cipher: &'a C,
        mode: Mode,
        layout: FileLayout,
        input: File,
        output: File,
        progress: &'a dyn Progress,
    ) -> Self {
        Self {
            cipher,
            mode,
            layout,
            input: Mutex::new(input),
            output: Mutex::new(output),
            aborted: AtomicBool::new(false),
            progress,
        }
    }

    /// Fill `buf` from the input at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> BfmtResult<()> {
        let mut input = lock(&self.input);
        input.seek(SeekFrom::Start(offset))?;
        input.read_exact(buf)?;
        Ok(())
    }

    /// Write all of `buf` to the output at `offset`.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> BfmtResult<()> {
        let mut output = lock(&self.output);
        output.seek(SeekFrom::Start(offset))?;
        output.write_all(buf)?;
        Ok(())
    }

    /// Read, transform and write back one span of the file.
    ///
    /// The buffer is private to the caller, so the cipher runs with no lock
    /// held.
    pub fn process_span(&self, offset: u64, buf: &mut [u8]) -> BfmtResult<()> {
        self.read_at(offset, buf)?;
        self.cipher.apply_frame(self.mode, buf);
        self.write_at(offset, buf)?;
        self.progress.advance(buf.len() as u64);
        Ok(())
    }

    /// Tell every thread to stop at its next frame boundary.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn set_output_len(&self, len: u64) -> BfmtResult<()> {
        lock(&self.output).set_len(len).map_err(BfmtError::from)
    }

    /// Push written data and the final length to disk.
    pub fn sync_output(&self) -> BfmtResult<()> {
        lock(&self.output).sync_all().map_err(BfmtError::from)
    }
}

// Every access seeks first, so a panic mid-access leaves no cursor state
// the next holder depends on.
fn lock(handle: &Mutex<File>) -> MutexGuard<'_, File> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
