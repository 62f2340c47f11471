//! bfmt-driver: multithreaded whole-file Blowfish encryption/decryption
//!
//! # Overview
//! - `layout`: static partitioning of the payload into worker ranges,
//!   frames, remainder and trailer
//! - `context`: the shared run state (cipher, layout, locked file handles)
//! - `pool`: spawn-N / join-N scoped worker threads
//! - `remainder`: whole blocks past the last worker range, done inline
//! - `padding`: the always-present trailer block and final truncation
//!
//! Output layout is ECB over 8-byte blocks followed by one padded trailer,
//! so ciphertext is identical for every worker count and frame size.

pub mod context;
pub mod layout;
pub mod padding;
pub mod pool;
pub mod remainder;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use bfmt_cipher::BlockCipher;
use bfmt_core::config::DriverConfig;
use bfmt_core::{BfmtError, BfmtResult, Mode, BLOCK_LEN};
use tracing::{debug, info, warn};

pub use context::{NoProgress, Progress, RunContext};
pub use layout::{clamp_workers, FileLayout, Frame};
pub use padding::{pad_trailer, unpad_trailer};
pub use pool::WorkerPool;

const BLOCK: u64 = BLOCK_LEN as u64;

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub layout: FileLayout,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Wall time from layout planning to the final truncation
    pub elapsed: Duration,
}

/// Encrypt or decrypt `input` into `output` with `cipher`.
///
/// `output` must be open for writing; its previous contents are replaced.
/// Any I/O failure stops every thread and is returned; the output is then
/// left partially written.
pub fn run<C>(
    cipher: &C,
    mode: Mode,
    input: File,
    output: File,
    config: &DriverConfig,
    progress: &dyn Progress,
) -> BfmtResult<RunReport>
where
    C: BlockCipher + Sync + ?Sized,
{
    let started = Instant::now();
    config.validate()?;

    let input_length = input.metadata()?.len();
    let payload = payload_length(mode, input_length)?;

    let requested = config.resolved_workers();
    let workers = clamp_workers(payload, requested);
    if workers < requested {
        warn!(
            requested,
            workers, payload, "fewer 8-byte blocks than workers, using fewer threads"
        );
    }
    let layout = FileLayout::plan(payload, workers, config.frame_threshold)?;

    info!(
        mode = %mode,
        bytes = input_length,
        workers,
        block_size = layout.block_size,
        frame_size = layout.frame_size,
        remainder = layout.remainder_length,
        "starting run"
    );

    let initial_len = match mode {
        Mode::Encrypt => layout.trailer_offset() + BLOCK,
        Mode::Decrypt => input_length,
    };
    output.set_len(initial_len)?;

    let ctx = RunContext::new(cipher, mode, layout, input, output, progress);

    let remainder_blocks = std::thread::scope(|scope| -> BfmtResult<u64> {
        let pool = WorkerPool::spawn(scope, &ctx)?;
        debug!(workers = pool.len(), "worker pool running");

        let remainder = remainder::process(&ctx);
        if remainder.is_err() {
            ctx.abort();
        }
        let joined = pool.join();

        let blocks = remainder?;
        joined?;
        Ok(blocks)
    })?;
    debug!(remainder_blocks, "all workers joined");

    let bytes_written = padding::finish(&ctx)?;
    ctx.sync_output()?;

    Ok(RunReport {
        mode,
        layout,
        bytes_read: input_length,
        bytes_written,
        elapsed: started.elapsed(),
    })
}

/// [`open_files`] then [`run`].
pub fn process_file<C>(
    cipher: &C,
    mode: Mode,
    input_path: &Path,
    output_path: &Path,
    config: &DriverConfig,
    progress: &dyn Progress,
) -> BfmtResult<RunReport>
where
    C: BlockCipher + Sync + ?Sized,
{
    let (input, output) = open_files(input_path, output_path)?;
    run(cipher, mode, input, output, config, progress)
}

/// Open `input_path` read-only and create or truncate `output_path`.
///
/// The output is opened without truncation first and compared with the
/// input by file identity, so a hard link or symlink to the input is
/// refused before any byte of it is lost.
pub fn open_files(input_path: &Path, output_path: &Path) -> BfmtResult<(File, File)> {
    let input = File::open(input_path)?;
    let output = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(output_path)?;

    if same_file(&input, &output, input_path, output_path)? {
        return Err(BfmtError::Config(format!(
            "input and output are the same file: {} and {}",
            input_path.display(),
            output_path.display()
        )));
    }

    output.set_len(0)?;
    Ok((input, output))
}

/// Bytes handed to the partitioner for an input of `input_length` bytes.
///
/// Decryption partitions everything but the trailer, which only the
/// padding step may touch.
pub fn payload_length(mode: Mode, input_length: u64) -> BfmtResult<u64> {
    match mode {
        Mode::Encrypt => {
            if input_length < BLOCK {
                return Err(BfmtError::InputTooShort {
                    length: input_length,
                    minimum: BLOCK,
                });
            }
            Ok(input_length)
        }
        Mode::Decrypt => {
            if input_length % BLOCK != 0 {
                return Err(BfmtError::InvalidCiphertextLength(input_length));
            }
            if input_length < 2 * BLOCK {
                return Err(BfmtError::InputTooShort {
                    length: input_length,
                    minimum: 2 * BLOCK,
                });
            }
            Ok(input_length - BLOCK)
        }
    }
}

/// Ciphertext length produced for `plaintext_length` bytes
pub fn encrypted_length(plaintext_length: u64) -> u64 {
    (plaintext_length / BLOCK + 1) * BLOCK
}

#[cfg(unix)]
fn same_file(a: &File, b: &File, _: &Path, _: &Path) -> BfmtResult<bool> {
    use std::os::unix::fs::MetadataExt;

    let (a, b) = (a.metadata()?, b.metadata()?);
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

// No stable file identity outside unix; fall back to resolved paths.
#[cfg(not(unix))]
fn same_file(_: &File, _: &File, a: &Path, b: &Path) -> BfmtResult<bool> {
    Ok(a.canonicalize()? == b.canonicalize()?)
}
