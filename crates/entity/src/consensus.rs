// Path: crates/entity/src/consensus.rs

//! The proposer-based BFT exchange over a replica.
//!
//! Phases: non-proposers forward transactions to the proposer (gather); the
//! proposer snapshots its mempool into a frame and broadcasts it (propose);
//! validators verify, lock, and send a signed precommit (precommit); the
//! proposer commits once accumulated shares reach the threshold and
//! broadcasts the committed frame with its signature set (commit).
//!
//! The fast path assumes an honest proposer: proposals do not time out and
//! there is no view change. A validator locked on a frame refuses a
//! conflicting proposal at the same height until its lock commits.

use crate::frame::frame_hash;
use crate::keyring::EntityKeyring;
use crate::reducer::{apply_frame_txs, EntityOutput};
use tracing::{debug, info, warn};
use xln_crypto::signer::{aggregate, verify_aggregate, verify_signature};
use xln_types::entity::{AggregateSig, EntityTx, Frame, FrameLock, Replica};
use xln_types::error::{ConsensusError, TransactionError};
use xln_types::primitives::{Hash32, SignerIdx};
use xln_types::server::{Command, Input};

fn consensus_to(replica: &Replica, signer: SignerIdx, command: Command) -> EntityOutput {
    EntityOutput::Consensus(Input {
        signer_idx: signer,
        entity_id: replica.entity,
        command,
    })
}

fn broadcast(replica: &Replica, command: impl Fn() -> Command) -> Vec<EntityOutput> {
    replica
        .state
        .config
        .validators
        .iter()
        .filter(|v| v.signer != replica.signer)
        .map(|v| consensus_to(replica, v.signer, command()))
        .collect()
}

fn validator_pubkey(replica: &Replica, signer: SignerIdx) -> Result<Vec<u8>, ConsensusError> {
    replica
        .state
        .config
        .validators
        .iter()
        .find(|v| v.signer == signer)
        .map(|v| v.pubkey.clone())
        .ok_or(ConsensusError::UnknownValidator(signer.0))
}

/// Adds a transaction to the replica.
///
/// Non-proposer replicas forward to the proposer (the gather phase); the
/// proposer queues locally. Signer-originated transactions must carry the
/// next nonce in sequence, accounting for transactions already queued.
pub fn add_tx(replica: &mut Replica, tx: EntityTx) -> Result<Vec<EntityOutput>, TransactionError> {
    if let Some(header) = tx.header() {
        let stored = replica.state.nonces.get(&header.signer).copied().unwrap_or(0);
        let queued = replica
            .mempool
            .iter()
            .filter(|t| t.header().map(|h| h.signer) == Some(header.signer))
            .count() as u64;
        let expected = stored + queued + 1;
        if header.nonce != expected {
            return Err(TransactionError::NonceOutOfOrder {
                expected,
                got: header.nonce,
            });
        }
    }

    if replica.is_proposer() {
        replica.mempool.push(tx);
        return Ok(vec![]);
    }
    let proposer = replica
        .state
        .config
        .proposer()
        .ok_or_else(|| TransactionError::MissingState("entity has no validators".into()))?;
    debug!(target: "entity", "forwarding tx to proposer {}", proposer);
    Ok(vec![consensus_to(replica, proposer, Command::AddTx { tx })])
}

/// Snapshots the mempool into a proposed frame and broadcasts it.
///
/// Proposer only; errors with [`ConsensusError::ProposalInFlight`] while a
/// proposal is outstanding and [`ConsensusError::EmptyMempool`] when there
/// is nothing to propose.
pub fn propose(
    replica: &mut Replica,
    now: u64,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, ConsensusError> {
    if !replica.is_proposer() {
        return Err(ConsensusError::NotProposer);
    }
    if let Some(p) = &replica.proposal {
        return Err(ConsensusError::ProposalInFlight(p.height));
    }
    if replica.mempool.is_empty() {
        return Err(ConsensusError::EmptyMempool);
    }

    let txs: Vec<EntityTx> = std::mem::take(&mut replica.mempool);
    let (new_state, accepted, rejected, _outputs) =
        apply_frame_txs(replica.entity, &replica.state, &txs, now, keyring);
    for (tx, err) in &rejected {
        warn!(target: "entity", "dropping tx from proposal: kind={} err={}", tx.kind(), err);
    }
    if accepted.is_empty() {
        return Err(ConsensusError::EmptyMempool);
    }

    let height = replica.state.height + 1;
    let hash = frame_hash(height, &accepted);
    let signature = keyring
        .consensus_key
        .sign(&hash)
        .map_err(|_| ConsensusError::InvalidSignature)?;

    let mut frame = Frame {
        height,
        txs: accepted,
        hash,
        new_state,
        signatures: Default::default(),
    };
    frame.signatures.insert(replica.signer, signature);

    replica.locked = Some(FrameLock { height, hash });
    replica.proposal = Some(frame.clone());
    info!(
        target: "entity",
        "proposed frame h={} txs={} for {}",
        height,
        frame.txs.len(),
        replica.entity
    );

    let mut outputs = broadcast(replica, || Command::ReceiveProposal {
        frame: frame.clone(),
    });
    // A single-validator quorum commits on its own signature.
    outputs.extend(try_commit(replica, keyring)?);
    Ok(outputs)
}

/// Handles a proposed frame on a validator replica: verify, lock, precommit.
pub fn receive_proposal(
    replica: &mut Replica,
    frame: &Frame,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, ConsensusError> {
    let expected = replica.state.height + 1;
    if frame.height != expected {
        return Err(ConsensusError::InvalidHeight {
            expected,
            got: frame.height,
        });
    }
    if frame_hash(frame.height, &frame.txs) != frame.hash {
        return Err(ConsensusError::HashMismatch);
    }

    // CometBFT-style lock: one frame per height until it commits.
    if let Some(lock) = &replica.locked {
        if lock.height == frame.height && lock.hash != frame.hash {
            return Err(ConsensusError::ConflictingLock {
                height: frame.height,
            });
        }
    }

    let proposer = replica
        .state
        .config
        .proposer()
        .ok_or(ConsensusError::UnknownValidator(u64::MAX))?;
    let proposer_key = validator_pubkey(replica, proposer)?;
    let proposer_sig = frame
        .signatures
        .get(&proposer)
        .ok_or(ConsensusError::InvalidSignature)?;
    verify_signature(&proposer_key, &frame.hash, proposer_sig)
        .map_err(|_| ConsensusError::InvalidSignature)?;

    // Replay the transition locally and insist on an identical post-state.
    let (recomputed, accepted, rejected, _outputs) = apply_frame_txs(
        replica.entity,
        &replica.state,
        &frame.txs,
        frame.new_state.timestamp,
        keyring,
    );
    if !rejected.is_empty() || accepted.len() != frame.txs.len() || recomputed != frame.new_state {
        return Err(ConsensusError::HashMismatch);
    }

    replica.locked = Some(FrameLock {
        height: frame.height,
        hash: frame.hash,
    });
    let signature = keyring
        .consensus_key
        .sign(&frame.hash)
        .map_err(|_| ConsensusError::InvalidSignature)?;
    debug!(
        target: "entity",
        "locked on frame h={} for {}, precommitting",
        frame.height,
        replica.entity
    );
    Ok(vec![consensus_to(
        replica,
        proposer,
        Command::SignFrame {
            height: frame.height,
            hash: frame.hash,
            signer: replica.signer,
            signature,
        },
    )])
}

/// Handles a precommit on the proposer replica, committing at quorum.
pub fn sign_frame(
    replica: &mut Replica,
    height: u64,
    hash: Hash32,
    signer: SignerIdx,
    signature: Vec<u8>,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, ConsensusError> {
    let (p_height, p_hash) = match &replica.proposal {
        Some(p) => (p.height, p.hash),
        // The precommit outlived its proposal (already committed); ignore.
        None => return Ok(vec![]),
    };
    if p_height != height || p_hash != hash {
        return Err(ConsensusError::HashMismatch);
    }
    let pubkey = validator_pubkey(replica, signer)?;
    verify_signature(&pubkey, &hash, &signature)
        .map_err(|_| ConsensusError::InvalidSignature)?;
    if let Some(proposal) = &mut replica.proposal {
        proposal.signatures.insert(signer, signature);
    }

    try_commit(replica, keyring)
}

/// Commits the outstanding proposal if its shares reach the threshold.
fn try_commit(
    replica: &mut Replica,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, ConsensusError> {
    let Some(proposal) = &replica.proposal else {
        return Ok(vec![]);
    };
    let config = &replica.state.config;
    let have: u128 = proposal
        .signatures
        .keys()
        .filter_map(|s| config.shares_of(*s))
        .sum();
    if have < config.threshold {
        debug!(
            target: "entity",
            "holding at h={}: {} of {} shares",
            proposal.height,
            have,
            config.threshold
        );
        return Ok(vec![]);
    }

    // Aggregate in ascending signer order.
    let signers: Vec<SignerIdx> = proposal.signatures.keys().copied().collect();
    let sigs: Vec<Vec<u8>> = proposal.signatures.values().cloned().collect();
    let agg = aggregate(&sigs).map_err(|_| ConsensusError::AggSigInvalid)?;
    let agg_sig = AggregateSig { signers, sig: agg };

    let frame = replica
        .proposal
        .take()
        .ok_or(ConsensusError::HashMismatch)?;

    // Recompute side effects of the transition (deterministic re-run).
    let (_, _, _, mut outputs) = apply_frame_txs(
        replica.entity,
        &replica.state,
        &frame.txs,
        frame.new_state.timestamp,
        keyring,
    );
    // The frame's quorum is the batch authorization.
    for output in &mut outputs {
        if let EntityOutput::SubmitBatch(submission) = output {
            if submission.hanko.sig.is_empty() {
                submission.hanko.sig = agg_sig.sig.clone();
            }
        }
    }

    // Broadcast to the quorum that signed, before any board rotation in the
    // new state takes effect.
    outputs.extend(broadcast(replica, || Command::CommitFrame {
        frame: frame.clone(),
        agg_sig: agg_sig.clone(),
    }));

    replica.state = frame.new_state.clone();
    replica.locked = None;
    info!(
        target: "entity",
        "committed frame h={} for {} with {} shares",
        frame.height,
        replica.entity,
        have
    );
    Ok(outputs)
}

/// Handles a committed frame on a follower replica.
///
/// The follower verifies the quorum proof and the state transition before
/// adopting; an invalid aggregate refuses the commit with no state change.
pub fn commit_frame(
    replica: &mut Replica,
    frame: &Frame,
    agg_sig: &AggregateSig,
    keyring: &EntityKeyring,
) -> Result<Vec<EntityOutput>, ConsensusError> {
    if frame.height == replica.state.height {
        // Already adopted (e.g. we precommitted and the commit raced a
        // duplicate broadcast). Idempotent.
        return Ok(vec![]);
    }
    let expected = replica.state.height + 1;
    if frame.height != expected {
        return Err(ConsensusError::InvalidHeight {
            expected,
            got: frame.height,
        });
    }
    if frame_hash(frame.height, &frame.txs) != frame.hash {
        return Err(ConsensusError::HashMismatch);
    }

    // Distinct signers, ascending, all inside the quorum.
    let mut seen = std::collections::BTreeSet::new();
    for signer in &agg_sig.signers {
        if !seen.insert(*signer) {
            return Err(ConsensusError::AggSigInvalid);
        }
    }
    let config = &replica.state.config;
    let have: u128 = seen.iter().filter_map(|s| config.shares_of(*s)).sum();
    if have < config.threshold {
        return Err(ConsensusError::QuorumNotReached {
            have,
            need: config.threshold,
        });
    }
    let pubkeys = agg_sig
        .signers
        .iter()
        .map(|s| validator_pubkey(replica, *s))
        .collect::<Result<Vec<_>, _>>()?;
    verify_aggregate(&pubkeys, &frame.hash, &agg_sig.sig)
        .map_err(|_| ConsensusError::AggSigInvalid)?;

    let (recomputed, accepted, rejected, _outputs) = apply_frame_txs(
        replica.entity,
        &replica.state,
        &frame.txs,
        frame.new_state.timestamp,
        keyring,
    );
    if !rejected.is_empty() || accepted.len() != frame.txs.len() || recomputed != frame.new_state {
        return Err(ConsensusError::HashMismatch);
    }

    replica.state = frame.new_state.clone();
    replica.locked = None;
    replica.proposal = None;
    // Drop any queued copies of the committed transactions.
    replica.mempool.retain(|tx| !frame.txs.contains(tx));
    info!(
        target: "entity",
        "adopted committed frame h={} for {}",
        frame.height,
        replica.entity
    );
    Ok(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_crypto::signer::{SignerKey, TestSigner};
    use xln_types::entity::{EntityState, Profile, QuorumConfig, TxHeader, ValidatorRecord};
    use xln_types::primitives::EntityId;

    fn quorum(shares: &[u128], threshold: u128) -> QuorumConfig {
        QuorumConfig {
            threshold,
            validators: shares
                .iter()
                .enumerate()
                .map(|(i, s)| ValidatorRecord {
                    signer: SignerIdx(i as u64),
                    pubkey: TestSigner::seeded(i as u64).public_bytes().to_vec(),
                    shares: *s,
                })
                .collect(),
        }
    }

    fn keyring_for(signer: u64) -> EntityKeyring {
        EntityKeyring::new(
            SignerKey::Test(TestSigner::seeded(signer)),
            SignerKey::Test(TestSigner::seeded(1000)),
        )
    }

    fn replicas(shares: &[u128], threshold: u128) -> Vec<Replica> {
        let entity = EntityId::from_index(7);
        let state = EntityState {
            config: quorum(shares, threshold),
            ..Default::default()
        };
        (0..shares.len())
            .map(|i| Replica::new(SignerIdx(i as u64), entity, state.clone()))
            .collect()
    }

    fn profile_tx(nonce: u64) -> EntityTx {
        EntityTx::ProfileUpdate {
            header: TxHeader {
                signer: SignerIdx(0),
                nonce,
            },
            profile: Profile {
                name: "hub".into(),
                ..Default::default()
            },
        }
    }

    fn unwrap_receive_proposal(output: &EntityOutput) -> Frame {
        match output {
            EntityOutput::Consensus(Input {
                command: Command::ReceiveProposal { frame },
                ..
            }) => frame.clone(),
            other => panic!("expected ReceiveProposal, got {:?}", other),
        }
    }

    #[test]
    fn three_validator_commit_at_threshold() {
        // Shares {V1:40, V2:35, V3:25}, threshold 67.
        let mut rs = replicas(&[40, 35, 25], 67);

        add_tx(&mut rs[0], profile_tx(1)).unwrap();
        let outputs = propose(&mut rs[0], 10, &keyring_for(0)).unwrap();
        // Broadcast to the two other validators, no commit yet (40 < 67).
        assert_eq!(outputs.len(), 2);
        let frame = unwrap_receive_proposal(&outputs[0]);

        // V2 precommits: 40 + 35 = 75 >= 67, proposer commits.
        let precommit = receive_proposal(&mut rs[1], &frame, &keyring_for(1)).unwrap();
        let (height, hash, signer, signature) = match &precommit[0] {
            EntityOutput::Consensus(Input {
                command:
                    Command::SignFrame {
                        height,
                        hash,
                        signer,
                        signature,
                    },
                ..
            }) => (*height, *hash, *signer, signature.clone()),
            other => panic!("expected SignFrame, got {:?}", other),
        };
        let commit_outputs =
            sign_frame(&mut rs[0], height, hash, signer, signature, &keyring_for(0)).unwrap();
        assert_eq!(rs[0].state.height, 1);
        assert_eq!(rs[0].state.profile.name, "hub");

        // V3 is informed and adopts.
        let (commit_frame_msg, agg) = commit_outputs
            .iter()
            .find_map(|o| match o {
                EntityOutput::Consensus(Input {
                    signer_idx,
                    command: Command::CommitFrame { frame, agg_sig },
                    ..
                }) if *signer_idx == SignerIdx(2) => Some((frame.clone(), agg_sig.clone())),
                _ => None,
            })
            .unwrap();
        commit_frame(&mut rs[2], &commit_frame_msg, &agg, &keyring_for(2)).unwrap();
        assert_eq!(rs[2].state.height, 1);
        assert_eq!(rs[2].state, rs[0].state);
    }

    #[test]
    fn below_threshold_holds() {
        // V3 alone precommits: 40 + 25 = 65 < 67.
        let mut rs = replicas(&[40, 35, 25], 67);
        add_tx(&mut rs[0], profile_tx(1)).unwrap();
        let outputs = propose(&mut rs[0], 10, &keyring_for(0)).unwrap();
        let frame = unwrap_receive_proposal(&outputs[1]);

        let precommit = receive_proposal(&mut rs[2], &frame, &keyring_for(2)).unwrap();
        let outputs = match &precommit[0] {
            EntityOutput::Consensus(Input {
                command:
                    Command::SignFrame {
                        height,
                        hash,
                        signer,
                        signature,
                    },
                ..
            }) => sign_frame(
                &mut rs[0],
                *height,
                *hash,
                *signer,
                signature.clone(),
                &keyring_for(0),
            )
            .unwrap(),
            other => panic!("expected SignFrame, got {:?}", other),
        };
        assert!(outputs.is_empty());
        assert_eq!(rs[0].state.height, 0);
        assert!(rs[0].proposal.is_some());
    }

    #[test]
    fn non_proposer_cannot_propose() {
        let mut rs = replicas(&[40, 35, 25], 67);
        let err = propose(&mut rs[1], 10, &keyring_for(1)).unwrap_err();
        assert!(matches!(err, ConsensusError::NotProposer));
    }

    #[test]
    fn empty_mempool_cannot_propose() {
        let mut rs = replicas(&[40, 35, 25], 67);
        let err = propose(&mut rs[0], 10, &keyring_for(0)).unwrap_err();
        assert!(matches!(err, ConsensusError::EmptyMempool));
    }

    #[test]
    fn second_proposal_in_flight_rejected() {
        let mut rs = replicas(&[40, 35, 25], 67);
        add_tx(&mut rs[0], profile_tx(1)).unwrap();
        propose(&mut rs[0], 10, &keyring_for(0)).unwrap();
        add_tx(&mut rs[0], profile_tx(2)).unwrap();
        let err = propose(&mut rs[0], 11, &keyring_for(0)).unwrap_err();
        assert!(matches!(err, ConsensusError::ProposalInFlight(1)));
    }

    #[test]
    fn conflicting_proposal_at_locked_height_rejected() {
        let mut rs = replicas(&[40, 35, 25], 67);
        add_tx(&mut rs[0], profile_tx(1)).unwrap();
        let outputs = propose(&mut rs[0], 10, &keyring_for(0)).unwrap();
        let frame = unwrap_receive_proposal(&outputs[0]);

        receive_proposal(&mut rs[1], &frame, &keyring_for(1)).unwrap();

        // A different frame at the same height must be refused.
        let mut conflicting = frame.clone();
        conflicting.txs = vec![profile_tx(1), profile_tx(2)];
        conflicting.hash = frame_hash(conflicting.height, &conflicting.txs);
        let err = receive_proposal(&mut rs[1], &conflicting, &keyring_for(1)).unwrap_err();
        assert!(matches!(err, ConsensusError::ConflictingLock { height: 1 }));
    }

    #[test]
    fn forwarded_txs_reach_the_proposer() {
        let mut rs = replicas(&[40, 35, 25], 67);
        let outputs = add_tx(&mut rs[1], profile_tx(1)).unwrap();
        assert_eq!(outputs.len(), 1);
        match &outputs[0] {
            EntityOutput::Consensus(Input {
                signer_idx,
                command: Command::AddTx { .. },
                ..
            }) => assert_eq!(*signer_idx, SignerIdx(0)),
            other => panic!("expected forwarded AddTx, got {:?}", other),
        }
        assert!(rs[1].mempool.is_empty());
    }

    #[test]
    fn tampered_aggregate_refused() {
        let mut rs = replicas(&[40, 35, 25], 67);
        add_tx(&mut rs[0], profile_tx(1)).unwrap();
        let outputs = propose(&mut rs[0], 10, &keyring_for(0)).unwrap();
        let frame = unwrap_receive_proposal(&outputs[0]);
        let precommit = receive_proposal(&mut rs[1], &frame, &keyring_for(1)).unwrap();
        let commit_outputs = match &precommit[0] {
            EntityOutput::Consensus(Input {
                command:
                    Command::SignFrame {
                        height,
                        hash,
                        signer,
                        signature,
                    },
                ..
            }) => sign_frame(
                &mut rs[0],
                *height,
                *hash,
                *signer,
                signature.clone(),
                &keyring_for(0),
            )
            .unwrap(),
            other => panic!("expected SignFrame, got {:?}", other),
        };
        let (commit_frame_msg, mut agg) = commit_outputs
            .iter()
            .find_map(|o| match o {
                EntityOutput::Consensus(Input {
                    signer_idx,
                    command: Command::CommitFrame { frame, agg_sig },
                    ..
                }) if *signer_idx == SignerIdx(2) => Some((frame.clone(), agg_sig.clone())),
                _ => None,
            })
            .unwrap();
        agg.sig = vec![0u8; agg.sig.len()];
        let err = commit_frame(&mut rs[2], &commit_frame_msg, &agg, &keyring_for(2)).unwrap_err();
        assert!(matches!(err, ConsensusError::AggSigInvalid));
        assert_eq!(rs[2].state.height, 0);
    }
}
