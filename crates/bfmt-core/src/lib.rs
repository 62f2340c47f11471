pub mod config;
pub mod error;
pub mod types;

pub use error::{BfmtError, BfmtResult};
pub use types::Mode;

/// Cipher block width in bytes. Every offset the driver hands out is a
/// multiple of this.
pub const BLOCK_LEN: usize = 8;

/// Shortest key accepted by the key schedule (32 bits)
pub const MIN_KEY_LEN: usize = 4;

/// Longest key accepted by the key schedule (448 bits)
pub const MAX_KEY_LEN: usize = 56;
