// Path: crates/crypto/src/signer.rs

//! Uniform signing interface for the consensus tiers.
//!
//! Production keys are BLS12-381 (96-byte public keys, 48-byte signatures).
//! The deterministic test scheme uses 32-byte keccak identities and is
//! FORGEABLE BY CONSTRUCTION: anyone holding a test public key can produce
//! "signatures" for it. It exists so deterministic multi-validator
//! topologies can run without curve arithmetic, and must never be configured
//! outside tests. Schemes are distinguished by public key length, so a
//! quorum config mixes them at its own peril (it must not).

use crate::bls::{
    aggregate_signatures, aggregate_verify, BlsKeyPair, BlsPublicKey, BlsSignature,
};
use crate::error::CryptoError;
use crate::hash::keccak256;

const TEST_PUBKEY_LEN: usize = 32;
const TEST_SIG_LEN: usize = 32;
const BLS_PUBKEY_LEN: usize = 96;

/// A signing identity held by a validator process.
#[derive(Clone)]
pub enum SignerKey {
    /// Production BLS key.
    Bls(BlsKeyPair),
    /// Deterministic test identity. Test topologies only.
    Test(TestSigner),
}

impl SignerKey {
    /// Signs `message` with this identity.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            SignerKey::Bls(kp) => Ok(kp.sign(message)?.to_bytes()),
            SignerKey::Test(t) => Ok(t.sign(message).to_vec()),
        }
    }

    /// The public key bytes to place in a quorum config.
    pub fn public_bytes(&self) -> Vec<u8> {
        match self {
            SignerKey::Bls(kp) => kp.public_key().to_bytes(),
            SignerKey::Test(t) => t.public_bytes().to_vec(),
        }
    }
}

/// Verifies `sig` over `message` for `pubkey`, dispatching on key length.
pub fn verify_signature(pubkey: &[u8], message: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
    match pubkey.len() {
        BLS_PUBKEY_LEN => {
            let pk = BlsPublicKey::from_bytes(pubkey)?;
            pk.verify(message, &BlsSignature::from_bytes(sig)?)
        }
        TEST_PUBKEY_LEN => {
            if TestSigner::expected_signature(pubkey, message).as_slice() == sig {
                Ok(())
            } else {
                Err(CryptoError::VerificationFailed)
            }
        }
        other => Err(CryptoError::InvalidLength {
            expected: BLS_PUBKEY_LEN,
            got: other,
        }),
    }
}

/// Aggregates a signature set. All signatures must belong to one scheme.
pub fn aggregate(sigs: &[Vec<u8>]) -> Result<Vec<u8>, CryptoError> {
    let first = sigs
        .first()
        .ok_or_else(|| CryptoError::OperationFailed("empty signature set".into()))?;
    if first.len() == TEST_SIG_LEN {
        // Test scheme: fold the ordered signature bytes.
        let mut preimage = Vec::with_capacity(sigs.len() * TEST_SIG_LEN);
        for sig in sigs {
            preimage.extend_from_slice(sig);
        }
        return Ok(keccak256(preimage).to_vec());
    }
    let parsed = sigs
        .iter()
        .map(|s| BlsSignature::from_bytes(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(aggregate_signatures(&parsed)?.to_bytes())
}

/// Verifies an aggregate signature over one `message` for the given key set,
/// in key-set order for the test scheme.
pub fn verify_aggregate(
    pubkeys: &[Vec<u8>],
    message: &[u8],
    agg: &[u8],
) -> Result<(), CryptoError> {
    let first = pubkeys
        .first()
        .ok_or_else(|| CryptoError::OperationFailed("empty public key set".into()))?;
    if first.len() == TEST_PUBKEY_LEN {
        let sigs: Vec<Vec<u8>> = pubkeys
            .iter()
            .map(|pk| TestSigner::expected_signature(pk, message).to_vec())
            .collect();
        let expected = aggregate(&sigs)?;
        if expected.as_slice() == agg {
            return Ok(());
        }
        return Err(CryptoError::VerificationFailed);
    }
    let parsed = pubkeys
        .iter()
        .map(|pk| BlsPublicKey::from_bytes(pk))
        .collect::<Result<Vec<_>, _>>()?;
    aggregate_verify(&parsed, message, &BlsSignature::from_bytes(agg)?)
}

/// A deterministic signer addressed by an explicit numeric id.
///
/// The "signature" is `keccak256(pubkey || message)`, reproducible by any
/// holder of the public key. Test topologies only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestSigner {
    /// Explicit signer id; never inferred from signature bytes.
    pub id: u64,
}

impl TestSigner {
    /// Creates the test signer with the given id.
    pub fn seeded(id: u64) -> Self {
        Self { id }
    }

    /// The 32-byte test public key for this id.
    pub fn public_bytes(&self) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(16 + 8);
        preimage.extend_from_slice(b"xln/test-signer/");
        preimage.extend_from_slice(&self.id.to_be_bytes());
        keccak256(preimage)
    }

    /// Signs `message` deterministically.
    pub fn sign(&self, message: &[u8]) -> [u8; 32] {
        Self::expected_signature(&self.public_bytes(), message)
    }

    fn expected_signature(pubkey: &[u8], message: &[u8]) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(pubkey.len() + message.len());
        preimage.extend_from_slice(pubkey);
        preimage.extend_from_slice(message);
        keccak256(preimage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_roundtrip() {
        let signer = TestSigner::seeded(3);
        let key = SignerKey::Test(signer);
        let sig = key.sign(b"frame").unwrap();
        assert!(verify_signature(&key.public_bytes(), b"frame", &sig).is_ok());
        assert!(verify_signature(&key.public_bytes(), b"other", &sig).is_err());
    }

    #[test]
    fn test_scheme_aggregate_roundtrip() {
        let keys: Vec<SignerKey> = (0..3).map(|i| SignerKey::Test(TestSigner::seeded(i))).collect();
        let pubkeys: Vec<Vec<u8>> = keys.iter().map(SignerKey::public_bytes).collect();
        let sigs: Vec<Vec<u8>> = keys.iter().map(|k| k.sign(b"frame").unwrap()).collect();

        let agg = aggregate(&sigs).unwrap();
        assert!(verify_aggregate(&pubkeys, b"frame", &agg).is_ok());
        assert!(verify_aggregate(&pubkeys, b"other", &agg).is_err());
        assert!(verify_aggregate(&pubkeys[..2], b"frame", &agg).is_err());
    }

    #[test]
    fn distinct_ids_get_distinct_keys() {
        assert_ne!(
            TestSigner::seeded(0).public_bytes(),
            TestSigner::seeded(1).public_bytes()
        );
    }

    #[test]
    fn bls_dispatch_by_key_length() {
        let kp = crate::bls::BlsKeyPair::from_seed(b"v0").unwrap();
        let key = SignerKey::Bls(kp);
        let sig = key.sign(b"frame").unwrap();
        assert_eq!(key.public_bytes().len(), 96);
        assert_eq!(sig.len(), 48);
        assert!(verify_signature(&key.public_bytes(), b"frame", &sig).is_ok());
    }
}
