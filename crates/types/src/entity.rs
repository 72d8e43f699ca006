// Path: crates/types/src/entity.rs

//! Data structures of the entity tier: quorum configuration, entity
//! transactions, consensus frames and replica snapshots.
//!
//! An entity is an autonomous organization whose actions require quorum from
//! a weighted validator set. Each validator holds a [`Replica`] of the
//! entity; replicas converge through the proposer-based BFT exchange
//! implemented in `xln-entity`.

use crate::account::{AccountInput, AccountMachine};
use crate::primitives::{EntityId, Hash32, SignerIdx, TokenId};
use crate::settlement::JEvent;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on the entity's application message journal.
pub const MAX_ENTITY_MESSAGES: usize = 256;

/// One validator within an entity's quorum.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ValidatorRecord {
    /// The validator's signer index; runtime inputs address its replica by
    /// this value.
    pub signer: SignerIdx,
    /// Public key material for signature verification.
    pub pubkey: Vec<u8>,
    /// Voting power. Quorum is reached on an absolute share sum.
    pub shares: u128,
}

/// The weighted validator set governing an entity.
///
/// The first validator in `validators` is the proposer. `threshold` is an
/// absolute share count, typically `⌈2·total/3⌉`.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct QuorumConfig {
    /// Absolute share count required to commit a frame.
    pub threshold: u128,
    /// Validators in proposer-first order.
    pub validators: Vec<ValidatorRecord>,
}

impl QuorumConfig {
    /// The proposer's signer index. `None` on an empty (unconfigured) set.
    pub fn proposer(&self) -> Option<SignerIdx> {
        self.validators.first().map(|v| v.signer)
    }

    /// Voting power of `signer`, if it is part of the quorum.
    pub fn shares_of(&self, signer: SignerIdx) -> Option<u128> {
        self.validators
            .iter()
            .find(|v| v.signer == signer)
            .map(|v| v.shares)
    }

    /// Sum of all configured shares.
    pub fn total_shares(&self) -> u128 {
        self.validators.iter().map(|v| v.shares).sum()
    }

    /// The conventional threshold for a share total: `⌈2·total/3⌉`.
    pub fn default_threshold(total: u128) -> u128 {
        (2 * total).div_ceil(3)
    }
}

/// A standing offer to swap one token for another inside an entity.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct SwapOffer {
    /// Monotonic offer id assigned by the entity state.
    pub id: u64,
    /// The signer that placed the offer; only it may cancel.
    pub owner: SignerIdx,
    /// Token offered.
    pub give_token: TokenId,
    /// Amount offered.
    pub give_amount: u128,
    /// Token requested.
    pub want_token: TokenId,
    /// Amount requested.
    pub want_amount: u128,
}

/// Public routing profile of an entity.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct Profile {
    /// Human-readable display name.
    pub name: String,
    /// Routing fee in parts per million.
    pub routing_fee_ppm: u32,
    /// Hub entities this entity advertises connectivity through.
    pub hubs: Vec<EntityId>,
}

/// A withdrawal queued for inclusion in the next settlement batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct WithdrawalRequest {
    /// Token to withdraw.
    pub token_id: TokenId,
    /// Amount to withdraw from reserves.
    pub amount: u128,
    /// Entity-state timestamp at which the request was recorded.
    pub requested_at: u64,
}

/// Replay-protection header carried by signer-originated transactions.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct TxHeader {
    /// The signer submitting the transaction.
    pub signer: SignerIdx,
    /// Strictly increasing per-signer counter.
    pub nonce: u64,
}

/// A transaction processed by the entity reducer.
///
/// Signer-originated kinds carry a [`TxHeader`]; `AccountInput` and `ImportJ`
/// are machine-generated and exempt from nonce tracking.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum EntityTx {
    /// Adopt a quorum configuration (entity bootstrap or board rotation).
    ImportReplica {
        /// Replay protection.
        header: TxHeader,
        /// The configuration to adopt.
        config: QuorumConfig,
    },
    /// Open a bilateral account with a counterparty entity.
    OpenAccount {
        /// Replay protection.
        header: TxHeader,
        /// The other side of the account.
        counterparty: EntityId,
        /// The counterparty's frame-signature verification key. Carried in
        /// the transaction so every replica opens an identical machine.
        peer_pubkey: Vec<u8>,
    },
    /// Queue a direct payment on the account with `counterparty`.
    DirectPayment {
        /// Replay protection.
        header: TxHeader,
        /// Account counterparty.
        counterparty: EntityId,
        /// Token to move.
        token_id: TokenId,
        /// Amount to pay toward the counterparty.
        amount: u128,
        /// Remaining hops for multi-hop routing, if any.
        route_hint: Vec<EntityId>,
    },
    /// Queue a hash-locked payment on the account with `counterparty`.
    HtlcPayment {
        /// Replay protection.
        header: TxHeader,
        /// Account counterparty.
        counterparty: EntityId,
        /// Token to lock.
        token_id: TokenId,
        /// Amount to lock.
        amount: u128,
        /// Hash lock over the secret.
        hash_lock: Hash32,
        /// Expiry as a frame timestamp.
        timeout: u64,
        /// Remaining hops for multi-hop routing, if any.
        route: Vec<EntityId>,
    },
    /// Move reserves to another entity on the jurisdiction (queued into the
    /// next settlement batch).
    ReserveToReserve {
        /// Replay protection.
        header: TxHeader,
        /// Receiving entity.
        to: EntityId,
        /// Token to move.
        token_id: TokenId,
        /// Amount to move.
        amount: u128,
    },
    /// Request an on-chain withdrawal of reserves.
    RequestWithdrawal {
        /// Replay protection.
        header: TxHeader,
        /// Token to withdraw.
        token_id: TokenId,
        /// Amount to withdraw.
        amount: u128,
    },
    /// Open a dispute on the account with `counterparty`.
    StartDispute {
        /// Replay protection.
        header: TxHeader,
        /// Account counterparty.
        counterparty: EntityId,
    },
    /// Submit an opaque payload to the jurisdiction via the outbox.
    JBroadcast {
        /// Replay protection.
        header: TxHeader,
        /// Raw batch payload.
        payload: Vec<u8>,
    },
    /// Replace the entity's public profile.
    ProfileUpdate {
        /// Replay protection.
        header: TxHeader,
        /// New profile.
        profile: Profile,
    },
    /// Place a swap offer into the entity's book.
    PlaceSwapOffer {
        /// Replay protection.
        header: TxHeader,
        /// Token offered.
        give_token: TokenId,
        /// Amount offered.
        give_amount: u128,
        /// Token requested.
        want_token: TokenId,
        /// Amount requested.
        want_amount: u128,
    },
    /// Remove a swap offer. Only the placing signer may cancel.
    CancelSwapOffer {
        /// Replay protection.
        header: TxHeader,
        /// Offer to remove.
        offer_id: u64,
    },
    /// Dispatch an inner bilateral message to one of our account machines.
    AccountInput {
        /// The wire message, addressed to this entity.
        input: AccountInput,
    },
    /// Ingest an authenticated settlement event from the jurisdiction.
    ImportJ {
        /// The event.
        event: JEvent,
    },
    /// Extend credit to `counterparty` on our side of the account
    /// (creating the token's ledger record if needed).
    SetAccountLimit {
        /// Replay protection.
        header: TxHeader,
        /// Account counterparty.
        counterparty: EntityId,
        /// Token whose limit changes.
        token_id: TokenId,
        /// New absolute limit extended by us.
        amount: u128,
    },
    /// Reveal an HTLC secret on the account with `counterparty`.
    RevealSecret {
        /// Replay protection.
        header: TxHeader,
        /// Account counterparty.
        counterparty: EntityId,
        /// The secret preimage.
        preimage: Vec<u8>,
    },
}

impl EntityTx {
    /// The replay-protection header, for signer-originated kinds.
    pub fn header(&self) -> Option<TxHeader> {
        match self {
            EntityTx::ImportReplica { header, .. }
            | EntityTx::OpenAccount { header, .. }
            | EntityTx::DirectPayment { header, .. }
            | EntityTx::HtlcPayment { header, .. }
            | EntityTx::ReserveToReserve { header, .. }
            | EntityTx::RequestWithdrawal { header, .. }
            | EntityTx::StartDispute { header, .. }
            | EntityTx::JBroadcast { header, .. }
            | EntityTx::ProfileUpdate { header, .. }
            | EntityTx::PlaceSwapOffer { header, .. }
            | EntityTx::CancelSwapOffer { header, .. }
            | EntityTx::SetAccountLimit { header, .. }
            | EntityTx::RevealSecret { header, .. } => Some(*header),
            EntityTx::AccountInput { .. } | EntityTx::ImportJ { .. } => None,
        }
    }

    /// Stable discriminant used in the frame hash preimage.
    pub fn kind(&self) -> u8 {
        match self {
            EntityTx::ImportReplica { .. } => 0,
            EntityTx::OpenAccount { .. } => 1,
            EntityTx::DirectPayment { .. } => 2,
            EntityTx::HtlcPayment { .. } => 3,
            EntityTx::ReserveToReserve { .. } => 4,
            EntityTx::RequestWithdrawal { .. } => 5,
            EntityTx::StartDispute { .. } => 6,
            EntityTx::JBroadcast { .. } => 7,
            EntityTx::ProfileUpdate { .. } => 8,
            EntityTx::PlaceSwapOffer { .. } => 9,
            EntityTx::CancelSwapOffer { .. } => 10,
            EntityTx::AccountInput { .. } => 11,
            EntityTx::ImportJ { .. } => 12,
            EntityTx::SetAccountLimit { .. } => 13,
            EntityTx::RevealSecret { .. } => 14,
        }
    }
}

/// The replicated application state of an entity.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct EntityState {
    /// Committed frame height.
    pub height: u64,
    /// Timestamp of the last committed frame.
    pub timestamp: u64,
    /// Strictly increasing per-signer nonces.
    pub nonces: BTreeMap<SignerIdx, u64>,
    /// Application message journal (most recent last, bounded).
    pub messages: Vec<String>,
    /// The governing quorum.
    pub config: QuorumConfig,
    /// Jurisdiction reserves mirrored per token.
    pub reserves: BTreeMap<TokenId, u128>,
    /// Bilateral accounts keyed by counterparty.
    pub accounts: BTreeMap<EntityId, AccountMachine>,
    /// Standing swap offers keyed by id.
    pub swap_offers: BTreeMap<u64, SwapOffer>,
    /// Next swap offer id to assign.
    pub next_offer_id: u64,
    /// Public routing profile.
    pub profile: Profile,
    /// Withdrawals awaiting the next settlement batch.
    pub withdrawals: Vec<WithdrawalRequest>,
    /// Accounts with an open dispute, keyed by counterparty.
    pub disputes: BTreeMap<EntityId, u64>,
    /// Settlement operations accumulated for the next batch flush.
    pub pending_batch: crate::settlement::Batch,
}

/// A signed, hash-chained entity state transition.
///
/// `hash` is `keccak256` of the canonical RLP preimage
/// `[height, [[kind, payload]…]]` where `payload` is the SCALE encoding of
/// each transaction (computed by `xln-entity`).
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    /// Frame height; increases by exactly one per commit.
    pub height: u64,
    /// Transactions applied by this frame, in order.
    pub txs: Vec<EntityTx>,
    /// Hash of the frame's canonical preimage.
    pub hash: Hash32,
    /// The entity state after applying `txs`.
    pub new_state: EntityState,
    /// Collected precommit signatures over `hash`, by signer.
    pub signatures: BTreeMap<SignerIdx, Vec<u8>>,
}

/// An aggregate signature proving a quorum signed a frame hash.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AggregateSig {
    /// The signers whose signatures are aggregated, ascending.
    pub signers: Vec<SignerIdx>,
    /// The aggregated signature bytes.
    pub sig: Vec<u8>,
}

/// A validator's lock on a proposal (CometBFT-style).
///
/// Once locked at a height, the validator refuses conflicting proposals at
/// that height until the locked frame commits.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct FrameLock {
    /// Height of the locked proposal.
    pub height: u64,
    /// Hash of the locked proposal.
    pub hash: Hash32,
}

/// One validator's view of one entity.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Replica {
    /// The validator holding this view.
    pub signer: SignerIdx,
    /// The entity being replicated.
    pub entity: EntityId,
    /// Committed entity state.
    pub state: EntityState,
    /// Transactions awaiting proposal.
    pub mempool: Vec<EntityTx>,
    /// The in-flight proposal, if we are the proposer and one is out.
    pub proposal: Option<Frame>,
    /// Our current lock, if any.
    pub locked: Option<FrameLock>,
}

impl Replica {
    /// Creates a replica of `entity` held by `signer` with the given state.
    pub fn new(signer: SignerIdx, entity: EntityId, state: EntityState) -> Self {
        Self {
            signer,
            entity,
            state,
            mempool: Vec::new(),
            proposal: None,
            locked: None,
        }
    }

    /// Whether this replica's signer is the configured proposer.
    pub fn is_proposer(&self) -> bool {
        self.state.config.proposer() == Some(self.signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quorum(shares: &[u128], threshold: u128) -> QuorumConfig {
        QuorumConfig {
            threshold,
            validators: shares
                .iter()
                .enumerate()
                .map(|(i, s)| ValidatorRecord {
                    signer: SignerIdx(i as u64),
                    pubkey: vec![i as u8],
                    shares: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn proposer_is_first_validator() {
        let q = quorum(&[40, 35, 25], 67);
        assert_eq!(q.proposer(), Some(SignerIdx(0)));
        assert_eq!(q.shares_of(SignerIdx(1)), Some(35));
        assert_eq!(q.shares_of(SignerIdx(9)), None);
        assert_eq!(q.total_shares(), 100);
    }

    #[test]
    fn default_threshold_is_two_thirds_rounded_up() {
        assert_eq!(QuorumConfig::default_threshold(100), 67);
        assert_eq!(QuorumConfig::default_threshold(3), 2);
        assert_eq!(QuorumConfig::default_threshold(300), 200);
    }

    #[test]
    fn header_presence_by_kind() {
        let header = TxHeader {
            signer: SignerIdx(0),
            nonce: 1,
        };
        let user_tx = EntityTx::RequestWithdrawal {
            header,
            token_id: TokenId(1),
            amount: 10,
        };
        assert!(user_tx.header().is_some());

        let sys_tx = EntityTx::ImportJ {
            event: JEvent::EntityRegistered {
                entity: EntityId::from_index(1),
                number: 1,
                board_hash: [0u8; 32],
            },
        };
        assert!(sys_tx.header().is_none());
    }
}
