//! Raw Blowfish key material

use bfmt_core::{BfmtError, BfmtResult, MAX_KEY_LEN, MIN_KEY_LEN};
use zeroize::Zeroize;

/// A raw Blowfish key of 4..=56 bytes. Zeroized on drop.
///
/// The bytes are used as-is; no passphrase stretching is applied.
#[derive(Clone)]
pub struct Key {
    bytes: Vec<u8>,
}

impl Key {
    /// Copy `bytes` into a new key, rejecting lengths outside 4..=56.
    pub fn new(bytes: &[u8]) -> BfmtResult<Self> {
        if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&bytes.len()) {
            return Err(BfmtError::InvalidKeyLength(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bits
    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("bits", &self.bits())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
