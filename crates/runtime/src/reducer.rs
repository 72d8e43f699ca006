// Path: crates/runtime/src/reducer.rs

//! The server frame reducer.
//!
//! Determinism contract: the same replica map, batch and `now` always yield
//! the same frame (root, inputs root, batch encoding). One input's rejection
//! never affects another; the rejected input is logged and skipped, and the
//! replica it addressed keeps its prior state.

use std::collections::BTreeMap;
use tracing::{debug, warn};
use xln_crypto::merkle_root;
use xln_crypto::rlp::encode_bytes;
use xln_entity::{EntityKeyring, EntityOutput};
use xln_types::codec;
use xln_types::entity::{EntityTx, Replica};
use xln_types::primitives::{EntityId, Hash32, SignerIdx};
use xln_types::server::{Command, Input, ServerFrame};

/// The replica map addressed by `(signer, entity)`.
pub type ReplicaMap = BTreeMap<(SignerIdx, EntityId), Replica>;

/// Side effects of one server tick, separated by destination.
#[derive(Debug, Default)]
pub struct TickEffects {
    /// Messages that re-enter the reducer as inputs of a later tick.
    pub requeued: Vec<Input>,
    /// Settlement submissions bound for the jurisdiction.
    pub submissions: Vec<xln_types::settlement::BatchSubmission>,
    /// Inputs rejected this tick, with their error text.
    pub rejected: Vec<(Input, String)>,
}

fn route_output(
    replicas: &ReplicaMap,
    output: EntityOutput,
    effects: &mut TickEffects,
) {
    match output {
        EntityOutput::Consensus(input) => effects.requeued.push(input),
        EntityOutput::AccountMessage { to, input } => {
            // Deliver one copy to the recipient entity, preferring its
            // proposer replica; remote entities are the transport's job.
            let target = replicas
                .values()
                .filter(|r| r.entity == to)
                .find(|r| r.is_proposer())
                .or_else(|| replicas.values().find(|r| r.entity == to));
            match target {
                Some(replica) => effects.requeued.push(Input {
                    signer_idx: replica.signer,
                    entity_id: to,
                    command: Command::AddTx {
                        tx: EntityTx::AccountInput { input },
                    },
                }),
                None => warn!(
                    target: "server",
                    "no local replica for {}; dropping account message",
                    to
                ),
            }
        }
        EntityOutput::SubmitBatch(submission) => effects.submissions.push(submission),
    }
}

fn dispatch(
    replica: &mut Replica,
    command: Command,
    now: u64,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, String> {
    match command {
        Command::AddTx { tx } => xln_entity::add_tx(replica, tx).map_err(|e| e.to_string()),
        Command::ProposeFrame => {
            xln_entity::propose(replica, now, keyring).map_err(|e| e.to_string())
        }
        Command::ReceiveProposal { frame } => {
            xln_entity::receive_proposal(replica, &frame, keyring).map_err(|e| e.to_string())
        }
        Command::SignFrame {
            height,
            hash,
            signer,
            signature,
        } => xln_entity::sign_frame(replica, height, hash, signer, signature, keyring)
            .map_err(|e| e.to_string()),
        Command::CommitFrame { frame, agg_sig } => {
            xln_entity::commit_frame(replica, &frame, &agg_sig, keyring).map_err(|e| e.to_string())
        }
        Command::ImportJEvent { event } => {
            xln_entity::add_tx(replica, EntityTx::ImportJ { event }).map_err(|e| e.to_string())
        }
        // Attach/Detach are handled above dispatch; reaching here is a
        // routing bug.
        Command::AttachReplica { .. } | Command::DetachReplica => {
            Err("lifecycle command reached dispatch".into())
        }
    }
}

/// Applies one batch of inputs to the replica map and emits the tick's frame.
///
/// Inputs are processed strictly in order; each is applied to a working copy
/// of its replica so a rejection leaves the map untouched by that input.
pub fn apply_server_frame(
    replicas: &mut ReplicaMap,
    batch: Vec<Input>,
    now: u64,
    height: u64,
    keyrings: &BTreeMap<(SignerIdx, EntityId), EntityKeyring>,
) -> (ServerFrame, TickEffects) {
    let mut effects = TickEffects::default();

    for input in &batch {
        let key = (input.signer_idx, input.entity_id);
        match &input.command {
            Command::AttachReplica { snapshot } => {
                if snapshot.signer != input.signer_idx || snapshot.entity != input.entity_id {
                    effects
                        .rejected
                        .push((input.clone(), "snapshot does not match its slot".into()));
                    continue;
                }
                replicas.insert(key, snapshot.clone());
                debug!(target: "server", "attached replica {:?}", key);
                continue;
            }
            Command::DetachReplica => {
                replicas.remove(&key);
                debug!(target: "server", "detached replica {:?}", key);
                continue;
            }
            _ => {}
        }

        let Some(keyring) = keyrings.get(&key) else {
            effects
                .rejected
                .push((input.clone(), "no keyring installed for slot".into()));
            continue;
        };
        let mut replica = match replicas.get(&key) {
            Some(r) => r.clone(),
            None => Replica::new(input.signer_idx, input.entity_id, Default::default()),
        };

        match dispatch(&mut replica, input.command.clone(), now, keyring) {
            Ok(outputs) => {
                replicas.insert(key, replica);
                for output in outputs {
                    route_output(replicas, output, &mut effects);
                }
            }
            Err(err) => {
                warn!(
                    target: "server",
                    "input rejected: cmd={} slot={:?} err={}",
                    input.command.label(),
                    key,
                    err
                );
                effects.rejected.push((input.clone(), err));
            }
        }
    }

    let frame = ServerFrame {
        height,
        timestamp: now,
        root: replica_root(replicas),
        inputs_root: inputs_root(&batch),
        batch,
    };
    (frame, effects)
}

/// Merkle root over the canonical encodings of all replicas, sorted by key.
pub fn replica_root(replicas: &ReplicaMap) -> Hash32 {
    let leaves: Vec<Vec<u8>> = replicas
        .values()
        .map(|r| codec::to_bytes_canonical(r))
        .collect();
    merkle_root(&leaves)
}

/// Merkle root over the batch's input encodings.
pub fn inputs_root(batch: &[Input]) -> Hash32 {
    let leaves: Vec<Vec<u8>> = batch
        .iter()
        .map(|i| encode_bytes(&codec::to_bytes_canonical(i)))
        .collect();
    merkle_root(&leaves)
}

/// Verifies that a frame's `inputs_root` matches its carried batch and that
/// `root` matches the given replica map.
pub fn verify_server_frame(frame: &ServerFrame, replicas: &ReplicaMap) -> bool {
    frame.inputs_root == inputs_root(&frame.batch) && frame.root == replica_root(replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_crypto::signer::{SignerKey, TestSigner};
    use xln_types::entity::{EntityState, Profile, QuorumConfig, TxHeader, ValidatorRecord};

    fn single_validator_setup() -> (
        ReplicaMap,
        BTreeMap<(SignerIdx, EntityId), EntityKeyring>,
        EntityId,
    ) {
        let entity = EntityId::from_index(1);
        let signer = SignerIdx(0);
        let state = EntityState {
            config: QuorumConfig {
                threshold: 1,
                validators: vec![ValidatorRecord {
                    signer,
                    pubkey: TestSigner::seeded(0).public_bytes().to_vec(),
                    shares: 1,
                }],
            },
            ..Default::default()
        };
        let mut replicas = ReplicaMap::new();
        replicas.insert((signer, entity), Replica::new(signer, entity, state));
        let mut keyrings = BTreeMap::new();
        keyrings.insert(
            (signer, entity),
            EntityKeyring::new(
                SignerKey::Test(TestSigner::seeded(0)),
                SignerKey::Test(TestSigner::seeded(1000)),
            ),
        );
        (replicas, keyrings, entity)
    }

    fn profile_input(entity: EntityId, nonce: u64) -> Input {
        Input {
            signer_idx: SignerIdx(0),
            entity_id: entity,
            command: Command::AddTx {
                tx: EntityTx::ProfileUpdate {
                    header: TxHeader {
                        signer: SignerIdx(0),
                        nonce,
                    },
                    profile: Profile {
                        name: "hub".into(),
                        ..Default::default()
                    },
                },
            },
        }
    }

    #[test]
    fn identical_batches_yield_identical_frames() {
        let (mut a, keyrings, entity) = single_validator_setup();
        let mut b = a.clone();
        let batch = vec![profile_input(entity, 1)];

        let (frame_a, _) = apply_server_frame(&mut a, batch.clone(), 42, 1, &keyrings);
        let (frame_b, _) = apply_server_frame(&mut b, batch, 42, 1, &keyrings);
        assert_eq!(frame_a, frame_b);
        assert_eq!(a, b);
        assert!(verify_server_frame(&frame_a, &a));
    }

    #[test]
    fn rejected_input_does_not_poison_the_batch() {
        let (mut replicas, keyrings, entity) = single_validator_setup();
        let bad = Input {
            signer_idx: SignerIdx(0),
            entity_id: entity,
            command: Command::ProposeFrame, // empty mempool: rejected
        };
        let batch = vec![bad, profile_input(entity, 1)];
        let (_, effects) = apply_server_frame(&mut replicas, batch, 1, 1, &keyrings);
        assert_eq!(effects.rejected.len(), 1);
        let replica = replicas.values().next().unwrap();
        assert_eq!(replica.mempool.len(), 1);
    }

    #[test]
    fn single_validator_commits_on_propose() {
        let (mut replicas, keyrings, entity) = single_validator_setup();
        let batch = vec![
            profile_input(entity, 1),
            Input {
                signer_idx: SignerIdx(0),
                entity_id: entity,
                command: Command::ProposeFrame,
            },
        ];
        let (_, effects) = apply_server_frame(&mut replicas, batch, 1, 1, &keyrings);
        assert!(effects.rejected.is_empty());
        let replica = replicas.values().next().unwrap();
        assert_eq!(replica.state.height, 1);
        assert_eq!(replica.state.profile.name, "hub");
    }

    #[test]
    fn attach_detach_lifecycle() {
        let (mut replicas, keyrings, entity) = single_validator_setup();
        let other = EntityId::from_index(2);
        let snapshot = Replica::new(SignerIdx(0), other, Default::default());
        let attach = Input {
            signer_idx: SignerIdx(0),
            entity_id: other,
            command: Command::AttachReplica { snapshot },
        };
        let (_, effects) = apply_server_frame(&mut replicas, vec![attach], 1, 1, &keyrings);
        assert!(effects.rejected.is_empty());
        assert_eq!(replicas.len(), 2);

        let detach = Input {
            signer_idx: SignerIdx(0),
            entity_id: other,
            command: Command::DetachReplica,
        };
        apply_server_frame(&mut replicas, vec![detach], 2, 2, &keyrings);
        assert_eq!(replicas.len(), 1);
    }

    #[test]
    fn mismatched_snapshot_rejected() {
        let (mut replicas, keyrings, entity) = single_validator_setup();
        let snapshot = Replica::new(SignerIdx(5), entity, Default::default());
        let attach = Input {
            signer_idx: SignerIdx(0),
            entity_id: entity,
            command: Command::AttachReplica { snapshot },
        };
        let (_, effects) = apply_server_frame(&mut replicas, vec![attach], 1, 1, &keyrings);
        assert_eq!(effects.rejected.len(), 1);
    }
}
