//! Integration test: encrypt → decrypt round-trip through real files
//!
//! Covers the padding contract, the worker-count clamp, worker-count
//! independence of the ciphertext, rejection of bad inputs, and how a
//! failing or panicking worker ends the run.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bfmt_cipher::{BlockCipher, Blowfish};
use bfmt_core::config::DriverConfig;
use bfmt_core::{BfmtError, Mode, BLOCK_LEN};
use bfmt_driver::{
    encrypted_length, process_file, FileLayout, NoProgress, Progress, RunContext, RunReport,
    WorkerPool,
};
use proptest::prelude::*;
use tempfile::TempDir;

const KEY: &[u8] = b"TESTKEY1";

fn write_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

fn config(workers: usize, frame_threshold: u64) -> DriverConfig {
    DriverConfig {
        workers,
        frame_threshold,
    }
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn encrypt_bytes(
    dir: &Path,
    key: &[u8],
    data: &[u8],
    cfg: &DriverConfig,
) -> Result<(Vec<u8>, RunReport), BfmtError> {
    let cipher = Blowfish::from_key_bytes(key)?;
    let src = write_test_file(dir, "plain.bin", data);
    let dst = dir.join("cipher.bin");
    let report = process_file(&cipher, Mode::Encrypt, &src, &dst, cfg, &NoProgress)?;
    Ok((std::fs::read(&dst)?, report))
}

fn decrypt_bytes(dir: &Path, key: &[u8], data: &[u8], cfg: &DriverConfig) -> Result<Vec<u8>, BfmtError> {
    let cipher = Blowfish::from_key_bytes(key)?;
    let src = write_test_file(dir, "cipher-in.bin", data);
    let dst = dir.join("plain-out.bin");
    process_file(&cipher, Mode::Decrypt, &src, &dst, cfg, &NoProgress)?;
    Ok(std::fs::read(&dst)?)
}

#[test]
fn roundtrip_various_lengths_and_workers() {
    let tmp = TempDir::new().unwrap();

    for len in [8usize, 9, 15, 16, 17, 63, 64, 65, 1000, 4097] {
        let original = make_data(len);
        for workers in [1usize, 2, 3, 4, 8] {
            let cfg = config(workers, 64);
            let (ciphertext, report) = encrypt_bytes(tmp.path(), KEY, &original, &cfg).unwrap();

            assert_eq!(
                ciphertext.len() as u64,
                encrypted_length(len as u64),
                "len {len}, workers {workers}"
            );
            assert_eq!(report.bytes_written, ciphertext.len() as u64);
            assert_eq!(report.bytes_read, len as u64);

            let decrypted = decrypt_bytes(tmp.path(), KEY, &ciphertext, &cfg).unwrap();
            assert_eq!(decrypted, original, "len {len}, workers {workers}");
        }
    }
}

#[test]
fn ciphertext_identical_across_worker_counts() {
    let tmp = TempDir::new().unwrap();
    let original = make_data(64 * 1024 + 13);

    let (reference, _) = encrypt_bytes(tmp.path(), KEY, &original, &config(1, 1024 * 1024)).unwrap();
    for workers in [1usize, 2, 4, 8] {
        for threshold in [8u64, 1024, 1024 * 1024] {
            let (ciphertext, report) =
                encrypt_bytes(tmp.path(), KEY, &original, &config(workers, threshold)).unwrap();
            assert_eq!(report.layout.worker_count, workers);
            assert_eq!(
                ciphertext, reference,
                "workers {workers}, frame threshold {threshold}"
            );
        }
    }
}

#[test]
fn reference_vector_holds_for_every_block_and_worker_count() {
    let tmp = TempDir::new().unwrap();
    let key = 0x0123456789ABCDEFu64.to_be_bytes();
    let original = vec![0x11u8; 8 * 37];
    let expected_block = 0x61F9C3802281B096u64.to_be_bytes();

    let cipher = Blowfish::from_key_bytes(&key).unwrap();
    let mut expected_trailer = [0x08u8; 8];
    cipher.encrypt_block(&mut expected_trailer);

    for workers in 1..=6 {
        let (ciphertext, _) = encrypt_bytes(tmp.path(), &key, &original, &config(workers, 16)).unwrap();
        let (body, trailer) = ciphertext.split_at(ciphertext.len() - 8);
        for (i, block) in body.chunks(8).enumerate() {
            assert_eq!(block, expected_block, "block {i}, workers {workers}");
        }
        assert_eq!(trailer, expected_trailer);
    }
}

#[test]
fn eight_byte_input_gets_full_padding_block() {
    let tmp = TempDir::new().unwrap();
    let (ciphertext, report) = encrypt_bytes(tmp.path(), KEY, b"ABCDEFGH", &config(1, 64)).unwrap();

    assert_eq!(ciphertext.len(), 16);
    assert_eq!(report.layout.padding_length, 8);

    let cipher = Blowfish::from_key_bytes(KEY).unwrap();
    let mut trailer: [u8; 8] = ciphertext[8..].try_into().unwrap();
    cipher.decrypt_block(&mut trailer);
    assert_eq!(trailer, [0x08; 8]);

    assert_eq!(
        ciphertext,
        [
            0xb6, 0x17, 0xf9, 0xd5, 0xd5, 0x25, 0xdd, 0x56, 0x5c, 0xce, 0xbb, 0x12, 0x54, 0x02,
            0xce, 0x5e,
        ]
    );
}

#[test]
fn fifteen_bytes_with_two_workers_falls_back_to_one() {
    let tmp = TempDir::new().unwrap();
    let original = b"fifteen bytes!!";

    let (ciphertext, report) = encrypt_bytes(tmp.path(), KEY, original, &config(2, 64)).unwrap();
    assert_eq!(report.layout.worker_count, 1);
    assert_eq!(report.layout.block_size, 8);
    assert_eq!(report.layout.padding_length, 1);
    assert_eq!(
        ciphertext,
        [
            0xd3, 0x0e, 0x8c, 0x36, 0x5f, 0xa3, 0x46, 0x2f, 0xc1, 0xc6, 0x51, 0x8b, 0xe5, 0xf2,
            0xab, 0xa7,
        ]
    );

    let decrypted = decrypt_bytes(tmp.path(), KEY, &ciphertext, &config(2, 64)).unwrap();
    assert_eq!(decrypted, original);
}

#[test]
fn short_plaintext_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let result = encrypt_bytes(tmp.path(), KEY, b"7 bytes", &config(1, 64));
    assert!(matches!(
        result,
        Err(BfmtError::InputTooShort { length: 7, minimum: 8 })
    ));
}

#[test]
fn misaligned_ciphertext_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let result = decrypt_bytes(tmp.path(), KEY, &[0u8; 17], &config(1, 64));
    assert!(matches!(result, Err(BfmtError::InvalidCiphertextLength(17))));
}

#[test]
fn corrupt_trailer_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();

    let mut body = *b"ABCDEFGH";
    let mut trailer = [1u8, 2, 3, 4, 5, 6, 7, 0];
    cipher.encrypt_block(&mut body);
    cipher.encrypt_block(&mut trailer);
    let forged: Vec<u8> = body.iter().chain(trailer.iter()).copied().collect();

    let result = decrypt_bytes(tmp.path(), KEY, &forged, &config(1, 64));
    assert!(matches!(result, Err(BfmtError::InvalidPadding(0))));
}

#[test]
fn wrong_key_fails_padding_check() {
    let tmp = TempDir::new().unwrap();
    let (ciphertext, _) = encrypt_bytes(tmp.path(), KEY, b"attack at dawn!!", &config(2, 64)).unwrap();

    // The trailer decrypts to ...6b under this key
    let result = decrypt_bytes(tmp.path(), b"WRONGKEY", &ciphertext, &config(2, 64));
    assert!(matches!(result, Err(BfmtError::InvalidPadding(0x6b))));
}

#[test]
fn invalid_key_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let result = encrypt_bytes(tmp.path(), b"abc", &make_data(64), &config(1, 64));
    assert!(matches!(result, Err(BfmtError::InvalidKeyLength(3))));
}

#[test]
fn same_input_and_output_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = write_test_file(tmp.path(), "inplace.bin", &make_data(64));
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();

    let result = process_file(&cipher, Mode::Encrypt, &path, &path, &config(1, 64), &NoProgress);
    assert!(matches!(result, Err(BfmtError::Config(_))));
    assert_eq!(std::fs::read(&path).unwrap(), make_data(64), "input must be untouched");
}

#[cfg(unix)]
#[test]
fn hard_link_to_input_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let input = write_test_file(tmp.path(), "in.bin", &make_data(64));
    let link = tmp.path().join("link.bin");
    std::fs::hard_link(&input, &link).unwrap();
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();

    let result = process_file(&cipher, Mode::Encrypt, &input, &link, &config(1, 64), &NoProgress);
    assert!(matches!(result, Err(BfmtError::Config(_))));
    assert_eq!(std::fs::read(&input).unwrap(), make_data(64), "input must be untouched");
}

#[cfg(unix)]
#[test]
fn symlink_to_input_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let input = write_test_file(tmp.path(), "in.bin", &make_data(64));
    let link = tmp.path().join("link.bin");
    std::os::unix::fs::symlink(&input, &link).unwrap();
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();

    let result = process_file(&cipher, Mode::Decrypt, &link, &input, &config(1, 64), &NoProgress);
    assert!(matches!(result, Err(BfmtError::Config(_))));
    assert_eq!(std::fs::read(&input).unwrap(), make_data(64));
}

#[test]
fn existing_output_is_replaced() {
    let tmp = TempDir::new().unwrap();
    let stale = vec![0xEEu8; 4096];
    write_test_file(tmp.path(), "cipher.bin", &stale);

    let (ciphertext, _) = encrypt_bytes(tmp.path(), KEY, b"ABCDEFGH", &config(1, 64)).unwrap();
    assert_eq!(ciphertext.len(), 16);
}

#[test]
fn missing_input_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();
    let result = process_file(
        &cipher,
        Mode::Encrypt,
        &tmp.path().join("does-not-exist"),
        &tmp.path().join("out"),
        &config(1, 64),
        &NoProgress,
    );
    assert!(matches!(result, Err(BfmtError::Io(_))));
}

#[derive(Default)]
struct CountingProgress(AtomicU64);

impl Progress for CountingProgress {
    fn advance(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }
}

#[test]
fn progress_counts_every_aligned_byte() {
    let tmp = TempDir::new().unwrap();
    let cipher = Blowfish::from_key_bytes(KEY).unwrap();
    let src = write_test_file(tmp.path(), "plain.bin", &make_data(10_007));
    let dst = tmp.path().join("cipher.bin");
    let progress = CountingProgress::default();

    let report = process_file(&cipher, Mode::Encrypt, &src, &dst, &config(3, 256), &progress).unwrap();

    // Everything except the 7 tail bytes folded into the trailer
    assert_eq!(report.layout.trailer_offset(), 10_000);
    assert_eq!(progress.0.load(Ordering::Relaxed), 10_000);
}

// ── Worker failure ────────────────────────────────────────────────────────────

/// XOR "cipher" that panics when it meets `marker`. Blocks other than the
/// marker optionally wait until the marker has been seen.
struct Tripwire {
    marker: [u8; BLOCK_LEN],
    tripped: AtomicBool,
    hold_others: bool,
}

impl Tripwire {
    fn new(marker: [u8; BLOCK_LEN], hold_others: bool) -> Self {
        Self {
            marker,
            tripped: AtomicBool::new(false),
            hold_others,
        }
    }

    fn wait_for_trip(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.tripped.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        // Leave the tripped worker time to unwind
        std::thread::sleep(Duration::from_millis(20));
    }
}

impl BlockCipher for Tripwire {
    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        if *block == self.marker {
            self.tripped.store(true, Ordering::SeqCst);
            panic!("tripwire block reached");
        }
        if self.hold_others {
            self.wait_for_trip();
        }
        for b in block.iter_mut() {
            *b ^= 0x5A;
        }
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        self.encrypt_block(block);
    }
}

const MARKER: [u8; BLOCK_LEN] = *b"TRIPWIRE";

#[test]
fn panicking_worker_is_reported_by_index() {
    let tmp = TempDir::new().unwrap();
    // 4 workers × 64 bytes; the marker sits in worker 2's range
    let mut data = vec![0u8; 256];
    data[128..136].copy_from_slice(&MARKER);
    let src = write_test_file(tmp.path(), "plain.bin", &data);
    let dst = tmp.path().join("cipher.bin");

    let cipher = Tripwire::new(MARKER, false);
    let result = process_file(&cipher, Mode::Encrypt, &src, &dst, &config(4, 16), &NoProgress);
    assert!(
        matches!(result, Err(BfmtError::WorkerPanicked(2))),
        "got {result:?}"
    );
}

#[test]
fn failing_worker_stops_the_others_early() {
    let tmp = TempDir::new().unwrap();
    // Every worker owns 64 one-block frames; worker 0 fails on its first
    let workers = 4;
    let per_worker = 64 * BLOCK_LEN;
    let mut data = vec![0u8; workers * per_worker];
    data[..BLOCK_LEN].copy_from_slice(&MARKER);
    let src = write_test_file(tmp.path(), "plain.bin", &data);
    let dst = tmp.path().join("cipher.bin");

    let cipher = Tripwire::new(MARKER, true);
    let progress = CountingProgress::default();
    let result = process_file(
        &cipher,
        Mode::Encrypt,
        &src,
        &dst,
        &config(workers, BLOCK_LEN as u64),
        &progress,
    );

    assert!(matches!(result, Err(BfmtError::WorkerPanicked(0))), "got {result:?}");
    let done = progress.0.load(Ordering::Relaxed);
    assert!(
        done < (data.len() / 4) as u64,
        "surviving workers kept going: {done} of {} bytes",
        data.len()
    );
}

#[test]
fn read_error_aborts_run_and_is_returned() {
    let tmp = TempDir::new().unwrap();
    // Planned for 256 bytes, but the file holds only worker 0's share
    let src = write_test_file(tmp.path(), "short.bin", &make_data(64));
    let input = File::open(&src).unwrap();
    let output = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp.path().join("out.bin"))
        .unwrap();

    let cipher = Blowfish::from_key_bytes(KEY).unwrap();
    let layout = FileLayout::plan(256, 4, 8).unwrap();
    let ctx = RunContext::new(&cipher, Mode::Encrypt, layout, input, output, &NoProgress);

    let result = std::thread::scope(|scope| WorkerPool::spawn(scope, &ctx)?.join());

    match result {
        Err(BfmtError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected an I/O error, got {other:?}"),
    }
    assert!(ctx.is_aborted());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn roundtrip_any_input(
        data in proptest::collection::vec(any::<u8>(), 8..=4096),
        key in proptest::collection::vec(any::<u8>(), 4..=56),
        workers in 1usize..=8,
        threshold_blocks in 1u64..=16,
    ) {
        let tmp = TempDir::new().unwrap();
        let cfg = config(workers, threshold_blocks * 8);

        let (ciphertext, _) = encrypt_bytes(tmp.path(), &key, &data, &cfg).unwrap();
        prop_assert_eq!(ciphertext.len() % 8, 0);
        prop_assert!(ciphertext.len() > data.len());
        prop_assert!(ciphertext.len() - data.len() <= 8);

        let decrypted = decrypt_bytes(tmp.path(), &key, &ciphertext, &cfg).unwrap();
        prop_assert_eq!(decrypted, data);
    }
}
