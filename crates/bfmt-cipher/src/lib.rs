//! bfmt-cipher: Blowfish block cipher core
//!
//! Pipeline: raw key bytes → [`Key`] (length check) → [`Blowfish`] (key
//! schedule) → [`BlockCipher`] calls on 8-byte blocks.
//!
//! ```text
//! π digits ──► P[18], S[4][256]
//!                │  XOR key bytes cyclically into P
//!                ▼
//!  encrypt running zero block 521 times, overwriting P then S in order
//!                │
//!                ▼
//!  immutable state, shared &-ref by every worker thread
//! ```
//!
//! No I/O and no locking happens here.

pub mod block;
pub mod blowfish;
pub mod key;
mod tables;

pub use block::BlockCipher;
pub use blowfish::Blowfish;
pub use key::Key;
