// Path: crates/crypto/src/bls.rs

//! BLS12-381 signatures using dcrypt.
//!
//! Signatures live in G1, public keys in G2, messages map to the curve via
//! `Scalar::hash_to_field`. Aggregation is G1 point addition; quorum
//! verification uses the same-message form `e(agg, g2) == e(H(m), Σ pk)`,
//! which is the only form the entity tier needs (all validators sign the
//! same frame hash).

use crate::error::CryptoError;
use dcrypt::algorithms::ec::bls12_381::{
    pairing, Bls12_381Scalar as Scalar, G1Affine, G1Projective, G2Affine, G2Projective,
};

// Domain separation tag for message hashing.
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";
// Domain separation tag for seed-derived secret keys.
const KEYGEN_DST: &[u8] = b"XLN-BLS-KEYGEN";

/// A BLS keypair.
#[derive(Clone)]
pub struct BlsKeyPair {
    public_key: BlsPublicKey,
    secret_key: BlsPrivateKey,
}

/// A BLS public key in G2 (96 bytes compressed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsPublicKey(pub G2Affine);

/// A BLS secret scalar.
#[derive(Clone)]
pub struct BlsPrivateKey(pub Scalar);

/// A BLS signature in G1 (48 bytes compressed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsSignature(pub G1Affine);

fn hash_to_g1(message: &[u8], dst: &[u8]) -> Result<G1Projective, CryptoError> {
    let scalar = Scalar::hash_to_field(message, dst)
        .map_err(|e| CryptoError::OperationFailed(format!("hash to field failed: {:?}", e)))?;
    Ok(G1Projective::generator() * scalar)
}

impl BlsKeyPair {
    /// Generates a keypair from the OS RNG. Never called inside a reducer.
    pub fn generate() -> Result<Self, CryptoError> {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_seed(&bytes)
    }

    /// Derives a keypair deterministically from a seed. Used for validator
    /// fixtures; the seed is hashed to the scalar field for uniformity.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let secret = Scalar::hash_to_field(seed, KEYGEN_DST)
            .map_err(|e| CryptoError::OperationFailed(format!("keygen failed: {:?}", e)))?;
        let public = G2Affine::from(G2Projective::generator() * secret);
        Ok(Self {
            public_key: BlsPublicKey(public),
            secret_key: BlsPrivateKey(secret),
        })
    }

    /// The public half.
    pub fn public_key(&self) -> BlsPublicKey {
        self.public_key.clone()
    }

    /// Signs `message`: `sig = sk · H(m)`.
    pub fn sign(&self, message: &[u8]) -> Result<BlsSignature, CryptoError> {
        let msg_point = hash_to_g1(message, BLS_DST)?;
        Ok(BlsSignature(G1Affine::from(msg_point * self.secret_key.0)))
    }
}

impl BlsPublicKey {
    /// Verifies `signature` over `message`: `e(sig, g2) == e(H(m), pk)`.
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> Result<(), CryptoError> {
        let msg_point = G1Affine::from(hash_to_g1(message, BLS_DST)?);
        let lhs = pairing(&signature.0, &G2Affine::generator());
        let rhs = pairing(&msg_point, &self.0);
        if lhs == rhs {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    /// Compressed G2 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().as_ref().to_vec()
    }

    /// Parses compressed G2 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 96] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: 96,
            got: bytes.len(),
        })?;
        let point = G2Affine::from_compressed(&arr)
            .into_option()
            .ok_or_else(|| CryptoError::Deserialization("invalid G2 point".into()))?;
        Ok(Self(point))
    }
}

impl BlsSignature {
    /// Compressed G1 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().as_ref().to_vec()
    }

    /// Parses compressed G1 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 48] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: 48,
            got: bytes.len(),
        })?;
        let point = G1Affine::from_compressed(&arr)
            .map_err(|_| CryptoError::Deserialization("invalid G1 point".into()))?;
        Ok(Self(point))
    }
}

/// Aggregates signatures by G1 addition. Fails on an empty set.
pub fn aggregate_signatures(sigs: &[BlsSignature]) -> Result<BlsSignature, CryptoError> {
    let mut iter = sigs.iter();
    let first = iter
        .next()
        .ok_or_else(|| CryptoError::OperationFailed("empty signature set".into()))?;
    let mut acc = G1Projective::from(first.0);
    for sig in iter {
        acc = acc + G1Projective::from(sig.0);
    }
    Ok(BlsSignature(G1Affine::from(acc)))
}

/// Aggregates public keys by G2 addition. Fails on an empty set.
pub fn aggregate_pubkeys(pks: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
    let mut iter = pks.iter();
    let first = iter
        .next()
        .ok_or_else(|| CryptoError::OperationFailed("empty public key set".into()))?;
    let mut acc = G2Projective::from(first.0);
    for pk in iter {
        acc = acc + G2Projective::from(pk.0);
    }
    Ok(BlsPublicKey(G2Affine::from(acc)))
}

/// Verifies an aggregate signature where every signer signed the same
/// `message`: `e(agg, g2) == e(H(m), Σ pk)`.
pub fn aggregate_verify(
    pks: &[BlsPublicKey],
    message: &[u8],
    agg: &BlsSignature,
) -> Result<(), CryptoError> {
    let combined = aggregate_pubkeys(pks)?;
    combined.verify(message, agg)
}
