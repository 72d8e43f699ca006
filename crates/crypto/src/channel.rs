// Path: crates/crypto/src/channel.rs

//! Channel-key derivation for bilateral accounts.

use crate::error::CryptoError;
use crate::hash::sha256;
use xln_types::primitives::{ordered_pair, EntityId, Hash32};

/// Deterministic on-chain identifier for the account between `a` and `b`:
/// `sha256(min(a,b) || max(a,b))`, independent of argument order.
pub fn channel_key(a: EntityId, b: EntityId) -> Result<Hash32, CryptoError> {
    let (left, right) = ordered_pair(a, b);
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_ref());
    preimage[32..].copy_from_slice(right.as_ref());
    sha256(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = EntityId::from_index(1);
        let b = EntityId::from_index(2);
        assert_eq!(channel_key(a, b).unwrap(), channel_key(b, a).unwrap());
    }

    #[test]
    fn key_distinguishes_pairs() {
        let a = EntityId::from_index(1);
        let b = EntityId::from_index(2);
        let c = EntityId::from_index(3);
        assert_ne!(channel_key(a, b).unwrap(), channel_key(a, c).unwrap());
    }
}
