use thiserror::Error;

pub type BfmtResult<T> = Result<T, BfmtError>;

#[derive(Debug, Error)]
pub enum BfmtError {
    #[error("invalid key length: {0} bytes (expected 4..=56)")]
    InvalidKeyLength(usize),

    #[error("input too short: {length} bytes (minimum {minimum})")]
    InputTooShort { length: u64, minimum: u64 },

    #[error("invalid worker count: {0} (must be at least 1)")]
    InvalidWorkerCount(usize),

    #[error("invalid frame threshold: {0} bytes (must be a non-zero multiple of 8)")]
    InvalidFrameThreshold(u64),

    #[error("ciphertext length {0} is not a multiple of the 8-byte block size")]
    InvalidCiphertextLength(u64),

    #[error("invalid padding trailer (pad byte {0:#04x}): wrong key or corrupted input")]
    InvalidPadding(u8),

    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
