// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for transport and
//! persistence of consensus-critical state.
//!
//! This module provides thin wrappers around `parity-scale-codec` (SCALE).
//! By centralizing the codec logic here in the base `types` crate, every
//! component uses the exact same serialization for replica snapshots, wire
//! messages and mempool contents, preventing divergence between two replicas
//! encoding the same value.
//!
//! Hash preimages that must reproduce the jurisdiction contract's bytes
//! (frame hashes, channel keys) do NOT go through this module; they use the
//! RLP helpers in `xln-crypto`.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical SCALE byte representation.
///
/// Use this for every value that is persisted, gossiped, or fed to the
/// replica-root merkle tree.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical SCALE byte representation.
///
/// Fails fast on trailing bytes or malformed input; a partial decode of
/// consensus state is never acceptable.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}
