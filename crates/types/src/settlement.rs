// Path: crates/types/src/settlement.rs

//! Jurisdiction-facing data structures: authenticated chain events, the
//! settlement batch submitted back to the contract, and FIFO debt records.
//!
//! Chain events are authoritative absolute-value overrides. They never add to
//! off-chain state; they replace the fields they carry.

use crate::primitives::{EntityId, Hash32, TokenId};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Absolute post-settlement values for one token of one account.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct SettlementDiff {
    /// Token settled.
    pub token_id: TokenId,
    /// New absolute collateral for the pair.
    pub collateral: u128,
    /// New absolute ondelta for the pair.
    pub ondelta: i128,
}

/// An authenticated event observed on the jurisdiction chain.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum JEvent {
    /// A new entity was registered on-chain.
    EntityRegistered {
        /// The entity's 32-byte tag.
        entity: EntityId,
        /// Sequential registration number.
        number: u64,
        /// Hash of the entity's governing board.
        board_hash: Hash32,
    },
    /// An entity's reserve balance changed to an absolute amount.
    ReserveUpdated {
        /// Entity whose reserve changed.
        entity: EntityId,
        /// Token concerned.
        token_id: TokenId,
        /// New absolute reserve.
        new_amount: u128,
    },
    /// Reserves were locked as collateral for a bilateral account.
    ReserveToCollateral {
        /// Left side of the pair (lexicographically smaller).
        left: EntityId,
        /// Right side of the pair.
        right: EntityId,
        /// Token concerned.
        token_id: TokenId,
        /// New absolute collateral.
        collateral: u128,
        /// New absolute ondelta.
        ondelta: i128,
    },
    /// A cooperative settlement was processed for a pair.
    SettlementProcessed {
        /// Left side of the pair.
        left: EntityId,
        /// Right side of the pair.
        right: EntityId,
        /// Absolute per-token outcomes.
        diffs: Vec<SettlementDiff>,
    },
    /// A dispute was opened on-chain for a pair.
    DisputeStarted {
        /// Left side of the pair.
        left: EntityId,
        /// Right side of the pair.
        right: EntityId,
        /// Dispute nonce on the contract.
        dispute_nonce: u64,
    },
    /// A dispute concluded with final per-token outcomes.
    DisputeFinalized {
        /// Left side of the pair.
        left: EntityId,
        /// Right side of the pair.
        right: EntityId,
        /// Absolute per-token outcomes.
        diffs: Vec<SettlementDiff>,
    },
}

/// An unpaid obligation owed by an entity, queued FIFO per `(entity, token)`.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Debt {
    /// Remaining amount owed.
    pub amount: u128,
    /// The entity owed.
    pub creditor: EntityId,
}

/// A reserve-to-reserve transfer inside a settlement batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ReserveToReserve {
    /// Receiving entity.
    pub to: EntityId,
    /// Token to move.
    pub token_id: TokenId,
    /// Amount to move.
    pub amount: u128,
}

/// A reserve-to-collateral lock inside a settlement batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ReserveToCollateralOp {
    /// Account counterparty.
    pub counterparty: EntityId,
    /// Token to lock.
    pub token_id: TokenId,
    /// Amount to lock.
    pub amount: u128,
}

/// A collateral-to-reserve release inside a settlement batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct CollateralToReserve {
    /// Account counterparty.
    pub counterparty: EntityId,
    /// Token to release.
    pub token_id: TokenId,
    /// Amount to release.
    pub amount: u128,
}

/// A cooperative settlement entry inside a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct SettlementOp {
    /// Account counterparty.
    pub counterparty: EntityId,
    /// Agreed absolute per-token outcomes.
    pub diffs: Vec<SettlementDiff>,
}

/// A dispute opening entry inside a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct DisputeStart {
    /// Account counterparty.
    pub counterparty: EntityId,
    /// The latest mutually signed account frame hash as evidence.
    pub proof_hash: Hash32,
}

/// A dispute finalization entry inside a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct DisputeFinalization {
    /// Account counterparty.
    pub counterparty: EntityId,
    /// Dispute nonce being finalized.
    pub dispute_nonce: u64,
}

/// An external-token deposit entry inside a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ExternalTokenToReserve {
    /// External contract address on the jurisdiction chain.
    pub contract: Vec<u8>,
    /// Internal token to credit.
    pub token_id: TokenId,
    /// Amount deposited.
    pub amount: u128,
}

/// An external-token withdrawal entry inside a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ReserveToExternalToken {
    /// Destination address on the jurisdiction chain.
    pub to: Vec<u8>,
    /// Internal token to debit.
    pub token_id: TokenId,
    /// Amount withdrawn.
    pub amount: u128,
}

/// A revealed HTLC secret submitted on-chain.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct RevealedSecret {
    /// The hash lock being satisfied.
    pub hash_lock: Hash32,
    /// The preimage.
    pub secret: Vec<u8>,
}

/// The batch of operations an entity submits to `processBatch`.
///
/// Authorization is by [`Hanko`]; there is no unauthenticated submission
/// path in this codebase.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct Batch {
    /// Reserve transfers to other entities.
    pub reserve_to_reserve: Vec<ReserveToReserve>,
    /// Reserve-to-collateral locks.
    pub reserve_to_collateral: Vec<ReserveToCollateralOp>,
    /// Collateral releases.
    pub collateral_to_reserve: Vec<CollateralToReserve>,
    /// Cooperative settlements.
    pub settlements: Vec<SettlementOp>,
    /// Dispute openings.
    pub dispute_starts: Vec<DisputeStart>,
    /// Dispute finalizations.
    pub dispute_finalizations: Vec<DisputeFinalization>,
    /// External deposits.
    pub external_token_to_reserve: Vec<ExternalTokenToReserve>,
    /// External withdrawals.
    pub reserve_to_external_token: Vec<ReserveToExternalToken>,
    /// HTLC secrets revealed on-chain.
    pub reveal_secrets: Vec<RevealedSecret>,
    /// Hub entity coordinating the batch, if any.
    pub hub_id: Option<EntityId>,
}

impl Batch {
    /// Whether the batch carries no operations at all.
    pub fn is_empty(&self) -> bool {
        self.reserve_to_reserve.is_empty()
            && self.reserve_to_collateral.is_empty()
            && self.collateral_to_reserve.is_empty()
            && self.settlements.is_empty()
            && self.dispute_starts.is_empty()
            && self.dispute_finalizations.is_empty()
            && self.external_token_to_reserve.is_empty()
            && self.reserve_to_external_token.is_empty()
            && self.reveal_secrets.is_empty()
    }
}

/// An aggregate signature proving an entity quorum authorized a batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Hanko {
    /// The authorizing entity.
    pub entity: EntityId,
    /// Aggregated signature bytes over the batch hash.
    pub sig: Vec<u8>,
}

/// A batch queued for on-chain submission, with its authorization.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BatchSubmission {
    /// Submitting entity.
    pub entity: EntityId,
    /// The operations.
    pub batch: Batch,
    /// Quorum authorization.
    pub hanko: Hanko,
}
