// Path: crates/types/src/account.rs

//! Data structures of the bilateral account tier.
//!
//! An account is the shared ledger between exactly two entities. Both sides
//! replay the same ordered transactions over the same [`Delta`] records and
//! must arrive at bitwise-identical frame hashes; everything here is therefore
//! canonically encodable and free of floats, maps with unstable ordering, or
//! platform-dependent widths.

use crate::primitives::{account_genesis_hash, EntityId, Hash32, Side, TokenId};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credit extended to a fresh [`Delta`] record before any explicit
/// `SetCreditLimit`. Unsecured capacity is opt-in, so this is zero.
pub const DEFAULT_CREDIT_LIMIT: u128 = 0;

/// Per-token balance state of one bilateral account.
///
/// The effective net transfer is `ondelta + offdelta`, positive toward the
/// right side. `collateral` and `ondelta` are absolute values owned by the
/// jurisdiction: settlement events overwrite them and never add to them.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct Delta {
    /// On-chain reserves locked for this account. Never negative.
    pub collateral: u128,
    /// Net on-chain diff, set absolutely by settlement events.
    pub ondelta: i128,
    /// Net off-chain diff, mutated by account transactions.
    pub offdelta: i128,
    /// Credit the left side extends to the right.
    pub left_credit_limit: u128,
    /// Credit the right side extends to the left.
    pub right_credit_limit: u128,
    /// Throttling cap on the left side.
    pub left_allowance: u128,
    /// Throttling cap on the right side.
    pub right_allowance: u128,
}

impl Delta {
    /// The combined net transfer, positive toward the right side.
    pub fn sum(&self) -> i128 {
        self.ondelta + self.offdelta
    }

    /// Credit limit extended BY `side` (i.e. usable by the other side).
    pub fn credit_limit(&self, side: Side) -> u128 {
        match side {
            Side::Left => self.left_credit_limit,
            Side::Right => self.right_credit_limit,
        }
    }
}

/// A conditional payment obligation pending inside an account.
///
/// Resolved by a preimage reveal strictly before `timeout`, or reversed to
/// the sender at any frame timestamp at or after `timeout`.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Htlc {
    /// Deterministic identifier, derived from the lock fields at creation.
    pub id: Hash32,
    /// Token the locked amount is denominated in.
    pub token_id: TokenId,
    /// Locked amount.
    pub amount: u128,
    /// Hash lock; a reveal must satisfy `sha256(preimage) == hash_lock`.
    pub hash_lock: Hash32,
    /// Frame timestamp at which the obligation reverses to the sender.
    pub timeout: u64,
    /// The side that locked the amount.
    pub sender: Side,
}

/// A transaction applied to a bilateral account ledger.
///
/// Application must preserve every account invariant; a transaction that
/// would violate one is rejected and never included in a frame.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum AccountTx {
    /// Shift `offdelta` by a signed amount; left-to-right is positive.
    DirectPayment {
        /// Token to move.
        token_id: TokenId,
        /// Signed amount; the payer is the left side iff positive.
        amount: i128,
        /// Remaining hops for multi-hop routing, if any.
        route_hint: Vec<EntityId>,
    },
    /// Lock a conditional obligation behind a hash lock.
    HtlcPayment {
        /// Token to lock.
        token_id: TokenId,
        /// Locked amount.
        amount: u128,
        /// Hash lock over the secret preimage.
        hash_lock: Hash32,
        /// Frame timestamp at which the lock expires.
        timeout: u64,
        /// The side locking the amount.
        sender: Side,
        /// Remaining hops for multi-hop routing, if any.
        route: Vec<EntityId>,
    },
    /// Resolve pending HTLCs whose lock matches `sha256(preimage)`.
    RevealSecret {
        /// The secret preimage.
        preimage: Vec<u8>,
    },
    /// Set the credit limit extended by `side`.
    SetCreditLimit {
        /// Token whose limit changes.
        token_id: TokenId,
        /// New absolute limit.
        amount: u128,
        /// The side extending the credit.
        side: Side,
    },
    /// Absolute override of `collateral` and `ondelta` from a settlement
    /// event. Idempotent: applying the same override twice is a no-op.
    ReserveToCollateral {
        /// Token settled.
        token_id: TokenId,
        /// New absolute collateral.
        collateral: u128,
        /// New absolute ondelta.
        ondelta: i128,
    },
    /// Idempotent creation of a [`Delta`] record with default credit limits.
    AddDelta {
        /// Token to track.
        token_id: TokenId,
    },
}

impl AccountTx {
    /// Stable discriminant used in the frame hash preimage.
    pub fn kind(&self) -> u8 {
        match self {
            AccountTx::DirectPayment { .. } => 0,
            AccountTx::HtlcPayment { .. } => 1,
            AccountTx::RevealSecret { .. } => 2,
            AccountTx::SetCreditLimit { .. } => 3,
            AccountTx::ReserveToCollateral { .. } => 4,
            AccountTx::AddDelta { .. } => 5,
        }
    }
}

/// A committed (or proposed) state transition of a bilateral account.
///
/// `state_hash` is `keccak256` of the canonical RLP preimage
/// `[height, timestamp, prev_frame_hash, [tx…], [token_id…], [delta_sum…]]`
/// computed by `xln-account`; `delta_sums[i]` is `ondelta + offdelta` for
/// `token_ids[i]` after the frame's transactions applied.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AccountFrame {
    /// Frame height; increases by exactly one per commit.
    pub height: u64,
    /// Timestamp supplied by the proposer's server tick.
    pub timestamp: u64,
    /// `state_hash` of the previous frame, or the genesis marker at height 0.
    pub prev_frame_hash: Hash32,
    /// Transactions applied by this frame, in order.
    pub account_txs: Vec<AccountTx>,
    /// Tokens tracked by the account, sorted ascending.
    pub token_ids: Vec<TokenId>,
    /// `ondelta + offdelta` per token, aligned with `token_ids`.
    pub delta_sums: Vec<i128>,
    /// Hash of this frame's canonical preimage.
    pub state_hash: Hash32,
}

impl AccountFrame {
    /// The synthetic frame an account starts from before any commit.
    pub fn genesis() -> Self {
        Self {
            height: 0,
            timestamp: 0,
            prev_frame_hash: [0u8; 32],
            account_txs: Vec::new(),
            token_ids: Vec::new(),
            delta_sums: Vec::new(),
            state_hash: account_genesis_hash(),
        }
    }
}

/// The bilateral wire message.
///
/// `counter` is a strictly monotonic per-direction sequence; a receiver
/// accepts only `counter == its last seen + 1` and otherwise drops the
/// message without advancing.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AccountInput {
    /// Sending entity.
    pub from: EntityId,
    /// Receiving entity.
    pub to: EntityId,
    /// Sender's committed account height when the message was built.
    pub height: u64,
    /// A newly proposed frame, if the sender is proposing.
    pub new_frame: Option<AccountFrame>,
    /// Sender's signatures over `new_frame.state_hash`.
    pub new_signatures: Vec<Vec<u8>>,
    /// Sender's signatures over the receiver's pending frame hash (an ACK).
    pub prev_signatures: Vec<Vec<u8>>,
    /// Per-direction anti-replay sequence number.
    pub counter: u64,
}

/// A proposed frame awaiting the counterparty's signature, together with the
/// post-state it commits to.
///
/// Post-state is snapshotted at proposal/verification time so that commit is
/// a pure swap and can never fail after signatures are exchanged.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct PendingAccountFrame {
    /// The frame itself.
    pub frame: AccountFrame,
    /// Our signature over `frame.state_hash`.
    pub our_signature: Vec<u8>,
    /// Delta records after the frame's transactions.
    pub post_deltas: BTreeMap<TokenId, Delta>,
    /// In-flight HTLCs after the frame's transactions.
    pub post_htlcs: BTreeMap<Hash32, Htlc>,
}

/// One side's view of a bilateral account.
///
/// `proposer_of_pending` distinguishes a frame we proposed (waiting for the
/// counterparty's ACK) from a counterparty frame we countersigned.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AccountMachine {
    /// The entity this machine belongs to.
    pub ours: EntityId,
    /// The entity on the other side of the ledger.
    pub counterparty: EntityId,
    /// Committed frame height.
    pub height: u64,
    /// Transactions queued for the next proposal.
    pub mempool: Vec<AccountTx>,
    /// Outstanding proposal, ours or countersigned, if any.
    pub pending_frame: Option<PendingAccountFrame>,
    /// Whether the pending frame was proposed by us.
    pub pending_is_ours: bool,
    /// Latest committed frame.
    pub current_frame: AccountFrame,
    /// Live per-token ledgers.
    pub deltas: BTreeMap<TokenId, Delta>,
    /// In-flight conditional obligations.
    pub htlcs: BTreeMap<Hash32, Htlc>,
    /// Last counter we sent toward the counterparty.
    pub counter_out: u64,
    /// Last counter we accepted from the counterparty.
    pub counter_in: u64,
    /// Count of transactions currently riding in our pending frame.
    pub sent_transitions: u64,
    /// The counterparty's verification key for frame signatures.
    pub peer_pubkey: Vec<u8>,
}

impl AccountMachine {
    /// Opens a fresh account machine between `ours` and `counterparty`.
    pub fn new(ours: EntityId, counterparty: EntityId, peer_pubkey: Vec<u8>) -> Self {
        Self {
            ours,
            counterparty,
            height: 0,
            mempool: Vec::new(),
            pending_frame: None,
            pending_is_ours: false,
            current_frame: AccountFrame::genesis(),
            deltas: BTreeMap::new(),
            htlcs: BTreeMap::new(),
            counter_out: 0,
            counter_in: 0,
            sent_transitions: 0,
            peer_pubkey,
        }
    }

    /// Whether we are the canonical left side of this account.
    pub fn is_left(&self) -> bool {
        self.ours.is_left(&self.counterparty)
    }

    /// Our side in canonical orientation.
    pub fn side(&self) -> Side {
        Side::of(&self.ours, &self.counterparty)
    }
}
