//! Blowfish: 16-round Feistel network over 64-bit blocks
//!
//! State is one 18-word P-array (round subkeys plus two whitening words)
//! and four 256-entry S-boxes, all seeded from π and then rewritten by the
//! key schedule. Halves are read big-endian, matching the published
//! reference vectors.

use bfmt_core::{BfmtResult, BLOCK_LEN};
use zeroize::Zeroize;

use crate::block::BlockCipher;
use crate::key::Key;
use crate::tables::{P_INIT, S_INIT};

const ROUNDS: usize = 16;

/// Keyed Blowfish state. Read-only after construction; zeroized on drop.
#[derive(Clone)]
pub struct Blowfish {
    p: [u32; ROUNDS + 2],
    s: [[u32; 256]; 4],
}

impl Blowfish {
    /// Run the full key schedule for `key`.
    ///
    /// This performs 521 block encryptions and must finish before any data
    /// block is processed; each step consumes the previous step's output.
    pub fn new(key: &Key) -> Self {
        let mut state = Self {
            p: P_INIT,
            s: S_INIT,
        };
        state.expand_key(key.as_bytes());
        state
    }

    /// Validate raw key bytes and run the key schedule.
    pub fn from_key_bytes(bytes: &[u8]) -> BfmtResult<Self> {
        let key = Key::new(bytes)?;
        Ok(Self::new(&key))
    }

    fn expand_key(&mut self, key: &[u8]) {
        let mut pos = 0;
        for subkey in self.p.iter_mut() {
            let mut word = 0u32;
            for _ in 0..4 {
                word = (word << 8) | u32::from(key[pos]);
                pos = (pos + 1) % key.len();
            }
            *subkey ^= word;
        }

        let (mut l, mut r) = (0u32, 0u32);
        for i in (0..ROUNDS + 2).step_by(2) {
            (l, r) = self.encrypt_halves(l, r);
            self.p[i] = l;
            self.p[i + 1] = r;
        }
        for sbox in 0..4 {
            for i in (0..256).step_by(2) {
                (l, r) = self.encrypt_halves(l, r);
                self.s[sbox][i] = l;
                self.s[sbox][i + 1] = r;
            }
        }
    }

    #[inline(always)]
    fn f(&self, x: u32) -> u32 {
        let [a, b, c, d] = x.to_be_bytes();
        (self.s[0][a as usize].wrapping_add(self.s[1][b as usize]) ^ self.s[2][c as usize])
            .wrapping_add(self.s[3][d as usize])
    }

    /// Encrypt one block given as (left, right) halves.
    pub fn encrypt_halves(&self, mut l: u32, mut r: u32) -> (u32, u32) {
        for i in 0..ROUNDS {
            l ^= self.p[i];
            r ^= self.f(l);
            std::mem::swap(&mut l, &mut r);
        }
        std::mem::swap(&mut l, &mut r);
        r ^= self.p[ROUNDS];
        l ^= self.p[ROUNDS + 1];
        (l, r)
    }

    /// Inverse of [`Blowfish::encrypt_halves`]: same network, subkeys reversed.
    pub fn decrypt_halves(&self, mut l: u32, mut r: u32) -> (u32, u32) {
        for i in (2..ROUNDS + 2).rev() {
            l ^= self.p[i];
            r ^= self.f(l);
            std::mem::swap(&mut l, &mut r);
        }
        std::mem::swap(&mut l, &mut r);
        r ^= self.p[1];
        l ^= self.p[0];
        (l, r)
    }

    pub fn encrypt_u64(&self, block: u64) -> u64 {
        let (l, r) = self.encrypt_halves((block >> 32) as u32, block as u32);
        (u64::from(l) << 32) | u64::from(r)
    }

    pub fn decrypt_u64(&self, block: u64) -> u64 {
        let (l, r) = self.decrypt_halves((block >> 32) as u32, block as u32);
        (u64::from(l) << 32) | u64::from(r)
    }
}

impl BlockCipher for Blowfish {
    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        *block = self.encrypt_u64(u64::from_be_bytes(*block)).to_be_bytes();
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        *block = self.decrypt_u64(u64::from_be_bytes(*block)).to_be_bytes();
    }
}

impl Drop for Blowfish {
    fn drop(&mut self) {
        self.p.zeroize();
        self.s.zeroize();
    }
}

impl std::fmt::Debug for Blowfish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blowfish")
            .field("state", &"[REDACTED]")
            .finish()
    }
}
