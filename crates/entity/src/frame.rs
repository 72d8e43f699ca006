// Path: crates/entity/src/frame.rs

//! Canonical entity frame hashing.
//!
//! The preimage is the RLP list `[height, [[kind, payload]…]]` where `kind`
//! is the transaction discriminant and `payload` the transaction's SCALE
//! encoding carried as an RLP byte string.

use xln_crypto::keccak256;
use xln_crypto::rlp::{encode_bytes, encode_list, encode_uint};
use xln_types::codec;
use xln_types::entity::EntityTx;
use xln_types::primitives::Hash32;

/// Computes the canonical hash of an entity frame's transactions.
pub fn frame_hash(height: u64, txs: &[EntityTx]) -> Hash32 {
    let tx_items: Vec<Vec<u8>> = txs
        .iter()
        .map(|tx| {
            encode_list(&[
                encode_uint(tx.kind() as u128),
                encode_bytes(&codec::to_bytes_canonical(tx)),
            ])
        })
        .collect();
    let preimage = encode_list(&[encode_uint(height as u128), encode_list(&tx_items)]);
    keccak256(preimage)
}
