// Path: crates/account/src/frame.rs

//! Canonical account frame construction and hashing.
//!
//! The state hash preimage is the RLP list
//! `[height, timestamp, prev_frame_hash, [tx…], [token_id…], [delta_sum…]]`
//! where each transaction is carried as its SCALE encoding inside an RLP
//! byte string, token ids are unsigned, and delta sums use the signed
//! `[sign, magnitude]` convention. keccak256 of the preimage is the hash the
//! two sides must agree on bit for bit.

use crate::apply::Scratch;
use xln_crypto::rlp::{encode_bytes, encode_list, encode_signed, encode_uint};
use xln_crypto::keccak256;
use xln_types::account::{AccountFrame, AccountTx};
use xln_types::codec;
use xln_types::primitives::{Hash32, TokenId};

/// Computes the canonical state hash of a frame's fields.
pub fn frame_state_hash(
    height: u64,
    timestamp: u64,
    prev_frame_hash: &Hash32,
    txs: &[AccountTx],
    token_ids: &[TokenId],
    delta_sums: &[i128],
) -> Hash32 {
    let tx_items: Vec<Vec<u8>> = txs
        .iter()
        .map(|tx| encode_bytes(&codec::to_bytes_canonical(tx)))
        .collect();
    let token_items: Vec<Vec<u8>> = token_ids
        .iter()
        .map(|t| encode_uint(t.0 as u128))
        .collect();
    let sum_items: Vec<Vec<u8>> = delta_sums.iter().map(|s| encode_signed(*s)).collect();

    let preimage = encode_list(&[
        encode_uint(height as u128),
        encode_uint(timestamp as u128),
        encode_bytes(prev_frame_hash),
        encode_list(&tx_items),
        encode_list(&token_items),
        encode_list(&sum_items),
    ]);
    keccak256(preimage)
}

/// Builds a frame over a post-state scratch, filling in the token ids,
/// delta sums and state hash.
pub fn build_frame(
    height: u64,
    timestamp: u64,
    prev_frame_hash: Hash32,
    txs: Vec<AccountTx>,
    post: &Scratch,
) -> AccountFrame {
    let (token_ids, delta_sums) = post.delta_sums();
    let state_hash = frame_state_hash(
        height,
        timestamp,
        &prev_frame_hash,
        &txs,
        &token_ids,
        &delta_sums,
    );
    AccountFrame {
        height,
        timestamp,
        prev_frame_hash,
        account_txs: txs,
        token_ids,
        delta_sums,
        state_hash,
    }
}

/// Recomputes a received frame's hash from its own fields.
pub fn recompute_state_hash(frame: &AccountFrame) -> Hash32 {
    frame_state_hash(
        frame.height,
        frame.timestamp,
        &frame.prev_frame_hash,
        &frame.account_txs,
        &frame.token_ids,
        &frame.delta_sums,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_types::account::Delta;
    use xln_types::primitives::account_genesis_hash;

    #[test]
    fn hash_covers_every_field() {
        let base = frame_state_hash(1, 10, &account_genesis_hash(), &[], &[], &[]);
        assert_ne!(
            base,
            frame_state_hash(2, 10, &account_genesis_hash(), &[], &[], &[])
        );
        assert_ne!(
            base,
            frame_state_hash(1, 11, &account_genesis_hash(), &[], &[], &[])
        );
        assert_ne!(base, frame_state_hash(1, 10, &[0u8; 32], &[], &[], &[]));
        assert_ne!(
            base,
            frame_state_hash(
                1,
                10,
                &account_genesis_hash(),
                &[],
                &[TokenId(1)],
                &[0]
            )
        );
    }

    #[test]
    fn delta_sum_sign_is_hashed() {
        let a = frame_state_hash(1, 0, &[0u8; 32], &[], &[TokenId(1)], &[5]);
        let b = frame_state_hash(1, 0, &[0u8; 32], &[], &[TokenId(1)], &[-5]);
        assert_ne!(a, b);
    }

    #[test]
    fn build_matches_recompute() {
        let mut post = Scratch::default();
        post.deltas.insert(
            TokenId(1),
            Delta {
                offdelta: 42,
                ..Default::default()
            },
        );
        let frame = build_frame(1, 7, account_genesis_hash(), vec![], &post);
        assert_eq!(frame.token_ids, vec![TokenId(1)]);
        assert_eq!(frame.delta_sums, vec![42]);
        assert_eq!(frame.state_hash, recompute_state_hash(&frame));
    }
}
