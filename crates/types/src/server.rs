// Path: crates/types/src/server.rs

//! Runtime-tier data structures: the command language consumed by the server
//! reducer and the authenticated frame it emits each tick.

use crate::entity::{AggregateSig, EntityTx, Frame, Replica};
use crate::primitives::{EntityId, Hash32, SignerIdx};
use crate::settlement::JEvent;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A command dispatched to a single `(signer, entity)` replica.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub enum Command {
    /// Add a transaction to the replica's mempool.
    AddTx {
        /// The transaction.
        tx: EntityTx,
    },
    /// Ask the proposer replica to snapshot its mempool into a frame.
    ProposeFrame,
    /// Deliver a proposed frame to a validator replica.
    ReceiveProposal {
        /// The proposer's frame.
        frame: Frame,
    },
    /// Deliver a validator's precommit signature to the proposer replica.
    SignFrame {
        /// Height of the frame being precommitted.
        height: u64,
        /// Hash of the frame being precommitted.
        hash: Hash32,
        /// The precommitting validator.
        signer: SignerIdx,
        /// Signature over `hash`.
        signature: Vec<u8>,
    },
    /// Deliver a committed frame and its quorum proof to a follower replica.
    CommitFrame {
        /// The committed frame, carrying the signature set.
        frame: Frame,
        /// Aggregated quorum signature over the frame hash.
        agg_sig: AggregateSig,
    },
    /// Install a replica snapshot for this `(signer, entity)` slot.
    AttachReplica {
        /// The snapshot to install.
        snapshot: Replica,
    },
    /// Remove the replica for this `(signer, entity)` slot.
    DetachReplica,
    /// Ingest a settlement event observed on the jurisdiction chain.
    ImportJEvent {
        /// The event.
        event: JEvent,
    },
}

impl Command {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::AddTx { .. } => "add_tx",
            Command::ProposeFrame => "propose_frame",
            Command::ReceiveProposal { .. } => "receive_proposal",
            Command::SignFrame { .. } => "sign_frame",
            Command::CommitFrame { .. } => "commit_frame",
            Command::AttachReplica { .. } => "attach_replica",
            Command::DetachReplica => "detach_replica",
            Command::ImportJEvent { .. } => "import_j_event",
        }
    }
}

/// One sequenced input: a command addressed to a `(signer, entity)` replica.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Input {
    /// Target signer index.
    pub signer_idx: SignerIdx,
    /// Target entity.
    pub entity_id: EntityId,
    /// The command to dispatch.
    pub command: Command,
}

/// The runtime's batched commit for one tick.
///
/// `root` is the merkle root over the canonical encodings of all replicas
/// (sorted by key); `inputs_root` is the merkle root over the batch's input
/// encodings. Recipients verify both against the carried batch.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ServerFrame {
    /// Server height; increases by exactly one per tick.
    pub height: u64,
    /// Tick timestamp.
    pub timestamp: u64,
    /// Merkle root over sorted replica encodings.
    pub root: Hash32,
    /// Merkle root over the batch input encodings.
    pub inputs_root: Hash32,
    /// The inputs consumed by this tick, in order.
    pub batch: Vec<Input>,
}
