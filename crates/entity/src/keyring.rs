// Path: crates/entity/src/keyring.rs

//! Key material a validator process holds for one entity.
//!
//! The consensus key signs precommits and is individual to the signer; the
//! account key signs bilateral frames on behalf of the entity and must be
//! identical across the entity's replicas (bilateral counterparties verify
//! against a single entity key).

use xln_crypto::signer::SignerKey;

/// Signing identities for one `(signer, entity)` replica.
#[derive(Clone)]
pub struct EntityKeyring {
    /// The signer's own consensus key.
    pub consensus_key: SignerKey,
    /// The entity's shared bilateral account key.
    pub account_key: SignerKey,
}

impl EntityKeyring {
    /// Builds a keyring from the two identities.
    pub fn new(consensus_key: SignerKey, account_key: SignerKey) -> Self {
        Self {
            consensus_key,
            account_key,
        }
    }
}
