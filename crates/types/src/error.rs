// Path: crates/types/src/error.rs

//! Core error types for the XLN workspace.
//!
//! Rejection is local: a bad transaction or wire message is dropped and
//! logged, the frame or batch it rode in continues without it. Only
//! [`RuntimeError`] variants abort the process, mapped to the documented
//! exit codes.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// A generic, top-level error for code paths without a more specific enum.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonical encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),
    /// A cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(String),
    /// Any other error.
    #[error("{0}")]
    Custom(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Codec(_) => "CORE_CODEC",
            Self::Crypto(_) => "CORE_CRYPTO",
            Self::Custom(_) => "CORE_CUSTOM",
        }
    }
}

/// Errors raised by the bilateral account tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// A wire message arrived with a counter that is not last-seen + 1.
    /// The message is dropped and the counter does not advance.
    #[error("Replay detected: expected counter {expected}, got {got}")]
    ReplayDetected {
        /// The counter we required.
        expected: u64,
        /// The counter the message carried.
        got: u64,
    },
    /// An incoming frame does not chain onto our committed frame.
    #[error("Frame chain broken: expected prev hash {expected}, got {got}")]
    ChainBroken {
        /// Hex of the prev hash we required.
        expected: String,
        /// Hex of the prev hash the frame carried.
        got: String,
    },
    /// Applying a transaction would violate an account invariant; the
    /// transaction is rejected before any mutation.
    #[error("Account invariant violated: {0}")]
    InvariantViolated(String),
    /// The transaction kind is not understood.
    #[error("Unknown account transaction")]
    UnknownTx,
    /// An ACK arrived but no frame is pending on our side.
    #[error("No pending frame to acknowledge")]
    NoPendingFrame,
    /// The machine cannot act yet (e.g. propose with an empty mempool).
    #[error("Account machine not ready: {0}")]
    NotReady(String),
    /// A signature over a frame hash failed verification.
    #[error("Bad signature on account frame")]
    BadSignature,
    /// An incoming frame's height does not extend ours by one.
    #[error("Frame height out of sequence: expected {expected}, got {got}")]
    HeightMismatch {
        /// The height we required.
        expected: u64,
        /// The height the frame carried.
        got: u64,
    },
}

impl ErrorCode for AccountError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReplayDetected { .. } => "ACCOUNT_REPLAY_DETECTED",
            Self::ChainBroken { .. } => "ACCOUNT_CHAIN_BROKEN",
            Self::InvariantViolated(_) => "ACCOUNT_INVARIANT_VIOLATED",
            Self::UnknownTx => "ACCOUNT_UNKNOWN_TX",
            Self::NoPendingFrame => "ACCOUNT_NO_PENDING_FRAME",
            Self::NotReady(_) => "ACCOUNT_NOT_READY",
            Self::BadSignature => "ACCOUNT_BAD_SIGNATURE",
            Self::HeightMismatch { .. } => "ACCOUNT_HEIGHT_MISMATCH",
        }
    }
}

/// Errors raised by the entity BFT tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// A non-proposer replica was asked to propose.
    #[error("This replica is not the proposer")]
    NotProposer,
    /// Propose was requested with nothing in the mempool.
    #[error("Mempool is empty")]
    EmptyMempool,
    /// Propose was requested while a proposal is already outstanding.
    #[error("A proposal is already in flight at height {0}")]
    ProposalInFlight(u64),
    /// A second, different proposal arrived at a locked height.
    #[error("Conflicting proposal at locked height {height}")]
    ConflictingLock {
        /// The locked height.
        height: u64,
    },
    /// A precommit arrived from a signer outside the quorum.
    #[error("Unknown validator {0}")]
    UnknownValidator(u64),
    /// Accumulated shares are below the threshold; the proposer holds.
    #[error("Quorum not reached: {have} of {need} shares")]
    QuorumNotReached {
        /// Shares accumulated so far.
        have: u128,
        /// Threshold required.
        need: u128,
    },
    /// The aggregate signature on a committed frame failed verification.
    /// The commit is refused and no state changes.
    #[error("Aggregate signature invalid")]
    AggSigInvalid,
    /// A frame arrived at an unexpected height.
    #[error("Frame height out of sequence: expected {expected}, got {got}")]
    InvalidHeight {
        /// The height we required.
        expected: u64,
        /// The height the frame carried.
        got: u64,
    },
    /// A frame's hash does not match its recomputed preimage.
    #[error("Frame hash mismatch")]
    HashMismatch,
    /// A signature in a consensus message was invalid.
    #[error("Invalid signature in consensus message")]
    InvalidSignature,
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotProposer => "CONSENSUS_NOT_PROPOSER",
            Self::EmptyMempool => "CONSENSUS_EMPTY_MEMPOOL",
            Self::ProposalInFlight(_) => "CONSENSUS_PROPOSAL_IN_FLIGHT",
            Self::ConflictingLock { .. } => "CONSENSUS_CONFLICTING_LOCK",
            Self::UnknownValidator(_) => "CONSENSUS_UNKNOWN_VALIDATOR",
            Self::QuorumNotReached { .. } => "CONSENSUS_QUORUM_NOT_REACHED",
            Self::AggSigInvalid => "CONSENSUS_AGG_SIG_INVALID",
            Self::InvalidHeight { .. } => "CONSENSUS_INVALID_HEIGHT",
            Self::HashMismatch => "CONSENSUS_HASH_MISMATCH",
            Self::InvalidSignature => "CONSENSUS_INVALID_SIGNATURE",
        }
    }
}

/// Errors raised while applying a single entity transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction's nonce is not the signer's next expected value.
    #[error("Nonce out of order: expected {expected}, got {got}")]
    NonceOutOfOrder {
        /// The nonce we required.
        expected: u64,
        /// The nonce the transaction carried.
        got: u64,
    },
    /// The transaction kind is not understood by this entity.
    #[error("Unknown entity transaction")]
    UnknownTx,
    /// Applying the transaction would violate an entity invariant.
    #[error("Entity invariant violated: {0}")]
    InvariantViolated(String),
    /// An inner account operation was rejected.
    #[error("Account rejected: {0}")]
    Account(#[from] AccountError),
    /// The transaction references state that does not exist.
    #[error("Missing state: {0}")]
    MissingState(String),
    /// The signer is not authorized for this operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ErrorCode for TransactionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NonceOutOfOrder { .. } => "TX_NONCE_OUT_OF_ORDER",
            Self::UnknownTx => "TX_UNKNOWN",
            Self::InvariantViolated(_) => "TX_INVARIANT_VIOLATED",
            Self::Account(_) => "TX_ACCOUNT_REJECTED",
            Self::MissingState(_) => "TX_MISSING_STATE",
            Self::Unauthorized(_) => "TX_UNAUTHORIZED",
        }
    }
}

/// Errors raised by the settlement adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The event's absolute values already match current state; the event
    /// is skipped idempotently.
    #[error("Settlement event is stale")]
    EventStale,
    /// The event references an account pair we do not track.
    #[error("Unknown channel for pair")]
    UnknownChannel,
    /// A batch operation would overdraw the entity's reserve.
    #[error("Insufficient reserve: have {have}, need {need}")]
    InsufficientReserve {
        /// Reserve currently held.
        have: u128,
        /// Amount required.
        need: u128,
    },
    /// Batch authorization failed.
    #[error("Hanko verification failed")]
    HankoInvalid,
}

impl ErrorCode for SettlementError {
    fn code(&self) -> &'static str {
        match self {
            Self::EventStale => "SETTLEMENT_EVENT_STALE",
            Self::UnknownChannel => "SETTLEMENT_UNKNOWN_CHANNEL",
            Self::InsufficientReserve { .. } => "SETTLEMENT_INSUFFICIENT_RESERVE",
            Self::HankoInvalid => "SETTLEMENT_HANKO_INVALID",
        }
    }
}

/// Fatal runtime errors, mapped to process exit codes.
///
/// `0` is the absence of any of these; per-input rejections never surface
/// here.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An invariant was found violated after mutation. Reaching this is a
    /// bug, not a runtime condition.
    #[error("Unrecoverable invariant violation: {0}")]
    InvariantViolated(String),
    /// The persistence layer failed.
    #[error("Persistence failure: {0}")]
    Persistence(String),
    /// The supplied configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvariantViolated(_) => 1,
            Self::Persistence(_) => 2,
            Self::Config(_) => 3,
        }
    }
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolated(_) => "RUNTIME_INVARIANT_VIOLATED",
            Self::Persistence(_) => "RUNTIME_PERSISTENCE",
            Self::Config(_) => "RUNTIME_CONFIG",
        }
    }
}
