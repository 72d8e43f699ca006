// Path: crates/crypto/src/merkle.rs

//! Binary merkle tree over keccak256.
//!
//! Leaves are hashed individually, then folded pairwise; an odd level
//! duplicates its final node. The empty tree is pinned to `keccak256("")`
//! so that an empty batch still yields a stable root.

use crate::hash::keccak256;
use xln_types::primitives::Hash32;

/// Computes the merkle root of `leaves`.
pub fn merkle_root(leaves: &[Vec<u8>]) -> Hash32 {
    if leaves.is_empty() {
        return keccak256([]);
    }
    let mut level: Vec<Hash32> = leaves.iter().map(keccak256).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let a = pair.first().copied().unwrap_or_default();
            // An odd level duplicates its last node.
            let b = pair.get(1).copied().unwrap_or(a);
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&a);
            buf[32..].copy_from_slice(&b);
            next.push(keccak256(buf));
        }
        level = next;
    }
    level.first().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_pinned() {
        assert_eq!(merkle_root(&[]), keccak256([]));
    }

    #[test]
    fn single_leaf_is_its_hash() {
        assert_eq!(merkle_root(&[b"a".to_vec()]), keccak256(b"a"));
    }

    #[test]
    fn pair_folds_once() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&a);
        buf[32..].copy_from_slice(&b);
        assert_eq!(merkle_root(&[b"a".to_vec(), b"b".to_vec()]), keccak256(buf));
    }

    #[test]
    fn odd_count_duplicates_last() {
        // Three leaves behave like four with the last repeated.
        let three = merkle_root(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        let four = merkle_root(&[
            b"a".to_vec(),
            b"b".to_vec(),
            b"c".to_vec(),
            b"c".to_vec(),
        ]);
        assert_eq!(three, four);
    }

    #[test]
    fn order_matters() {
        assert_ne!(
            merkle_root(&[b"a".to_vec(), b"b".to_vec()]),
            merkle_root(&[b"b".to_vec(), b"a".to_vec()])
        );
    }
}
