// Path: crates/crypto/src/hash.rs

//! Hash functions used across the three tiers.
//!
//! keccak256 is the jurisdiction contract's hash; every frame hash and merkle
//! node uses it. sha256 is used only where the contract uses it: channel-key
//! derivation and HTLC hash locks.

use crate::error::CryptoError;
use dcrypt::algorithms::hash::{HashFunction as DcryptHashFunction, Sha256 as DcryptSha256};
use dcrypt::algorithms::ByteSerializable;
use xln_types::primitives::Hash32;

/// keccak256 of `data`.
pub fn keccak256<T: AsRef<[u8]>>(data: T) -> Hash32 {
    alloy_primitives::keccak256(data.as_ref()).0
}

/// SHA-256 of `data`, via the dcrypt backend.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> Result<Hash32, CryptoError> {
    let digest = DcryptSha256::digest(data.as_ref())
        .map_err(|e| CryptoError::OperationFailed(e.to_string()))?;
    let bytes = digest.to_bytes();
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            expected: 32,
            got: len,
        })
}
