// Path: crates/crypto/src/rlp.rs

//! Canonical RLP helpers for hash preimages.
//!
//! Frame hashes must reproduce the jurisdiction contract's bytes exactly, so
//! the preimages are assembled with Ethereum's RLP rather than the SCALE
//! transport codec. Integers encode big-endian with leading zeros trimmed;
//! signed values (deltas) encode as a two-item list `[sign, magnitude]` with
//! `sign = 1` for negative, matching the contract's convention.

use alloy_rlp::Header;

/// RLP-encodes an unsigned integer.
pub fn encode_uint(v: u128) -> Vec<u8> {
    alloy_rlp::encode(v)
}

/// RLP-encodes a byte string.
pub fn encode_bytes(b: &[u8]) -> Vec<u8> {
    alloy_rlp::encode(b)
}

/// RLP-encodes a signed integer as the list `[sign, magnitude]`.
pub fn encode_signed(v: i128) -> Vec<u8> {
    let sign: u128 = if v < 0 { 1 } else { 0 };
    encode_list(&[encode_uint(sign), encode_uint(v.unsigned_abs())])
}

/// Wraps already-encoded items into an RLP list.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length: usize = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}
