// Path: crates/crypto/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

//! Cryptographic substrate for the XLN state machine.
//!
//! Everything here is deterministic and byte-exact with the jurisdiction
//! contract: keccak256 + canonical RLP for frame hashes, sha256 for channel
//! keys, BLS12-381 for validator signatures. Key generation is the only
//! operation that touches an RNG, and it never runs inside a reducer.

pub mod bls;
pub mod channel;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod rlp;
pub mod signer;

pub use channel::channel_key;
pub use error::CryptoError;
pub use hash::{keccak256, sha256};
pub use merkle::merkle_root;
