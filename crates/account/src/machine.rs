// Path: crates/account/src/machine.rs

//! The bilateral propose/receive protocol.
//!
//! Commit discipline: the proposer holds its frame as pending until the
//! counterparty's ACK signature arrives; the receiver of a valid frame
//! countersigns and commits immediately (it holds both signatures at that
//! point). Simultaneous proposals at the same height resolve by the
//! canonical tiebreak: the left side ignores the incoming frame and keeps
//! waiting for its ACK, the right side rolls its transactions back into the
//! mempool and adopts the left frame.

use crate::apply::{apply_frame_txs, Scratch};
use crate::frame::{build_frame, frame_state_hash};
use tracing::{debug, info, warn};
use xln_crypto::signer::{verify_signature, SignerKey};
use xln_types::account::{AccountInput, AccountMachine, PendingAccountFrame};
use xln_types::error::AccountError;

/// Proposes a frame over the current mempool.
///
/// Returns `None` when the mempool is empty or a pending frame is already
/// awaiting its ACK (a stuck ACK blocks further proposals from this side).
pub fn propose(
    machine: &mut AccountMachine,
    now: u64,
    key: &SignerKey,
) -> Result<Option<AccountInput>, AccountError> {
    if machine.pending_frame.is_some() {
        return Ok(None);
    }
    if machine.mempool.is_empty() {
        return Ok(None);
    }

    let txs: Vec<_> = std::mem::take(&mut machine.mempool);
    let mut scratch = Scratch::from_parts(&machine.deltas, &machine.htlcs);
    let (accepted, rejected) = apply_frame_txs(&mut scratch, &txs, now);
    for (tx, err) in &rejected {
        warn!(
            target: "account",
            "dropping tx from proposal: kind={} err={}",
            tx.kind(),
            err
        );
    }
    if accepted.is_empty() {
        return Ok(None);
    }

    let frame = build_frame(
        machine.height + 1,
        now,
        machine.current_frame.state_hash,
        accepted,
        &scratch,
    );
    let signature = key
        .sign(&frame.state_hash)
        .map_err(|_| AccountError::BadSignature)?;

    machine.sent_transitions = frame.account_txs.len() as u64;
    machine.pending_is_ours = true;
    machine.counter_out += 1;
    let input = AccountInput {
        from: machine.ours,
        to: machine.counterparty,
        height: machine.height,
        new_frame: Some(frame.clone()),
        new_signatures: vec![signature.clone()],
        prev_signatures: vec![],
        counter: machine.counter_out,
    };
    machine.pending_frame = Some(PendingAccountFrame {
        frame,
        our_signature: signature,
        post_deltas: scratch.deltas,
        post_htlcs: scratch.htlcs,
    });
    debug!(
        target: "account",
        "proposed frame h={} txs={} at t={}",
        machine.height + 1,
        machine.sent_transitions,
        now
    );
    Ok(Some(input))
}

/// Processes an incoming wire message, possibly producing a reply.
pub fn receive(
    machine: &mut AccountMachine,
    msg: &AccountInput,
    now: u64,
    key: &SignerKey,
) -> Result<Option<AccountInput>, AccountError> {
    if msg.to != machine.ours || msg.from != machine.counterparty {
        return Err(AccountError::NotReady("message not addressed to us".into()));
    }

    // Per-direction anti-replay. A mismatch drops the message without
    // advancing the counter.
    let expected = machine.counter_in + 1;
    if msg.counter != expected {
        return Err(AccountError::ReplayDetected {
            expected,
            got: msg.counter,
        });
    }
    machine.counter_in = msg.counter;

    // An ACK over our pending frame commits it.
    if !msg.prev_signatures.is_empty() {
        let pending = machine
            .pending_frame
            .as_ref()
            .ok_or(AccountError::NoPendingFrame)?;
        let hash = pending.frame.state_hash;
        let acked = msg
            .prev_signatures
            .iter()
            .any(|sig| verify_signature(&machine.peer_pubkey, &hash, sig).is_ok());
        if !acked {
            return Err(AccountError::BadSignature);
        }
        let pending = machine
            .pending_frame
            .take()
            .ok_or(AccountError::NoPendingFrame)?;
        machine.height = pending.frame.height;
        machine.deltas = pending.post_deltas;
        machine.htlcs = pending.post_htlcs;
        machine.current_frame = pending.frame;
        machine.pending_is_ours = false;
        machine.sent_transitions = 0;
        info!(
            target: "account",
            "committed frame h={} (ack) with {}",
            machine.height,
            machine.counterparty
        );
    }

    let Some(new_frame) = &msg.new_frame else {
        return Ok(None);
    };

    let expected_height = machine.height + 1;
    if new_frame.height != expected_height {
        return Err(AccountError::HeightMismatch {
            expected: expected_height,
            got: new_frame.height,
        });
    }
    if new_frame.prev_frame_hash != machine.current_frame.state_hash {
        return Err(AccountError::ChainBroken {
            expected: hex::encode(machine.current_frame.state_hash),
            got: hex::encode(new_frame.prev_frame_hash),
        });
    }

    // Simultaneous proposal: both sides proposed at the same height.
    if machine.pending_frame.is_some() {
        if machine.is_left() {
            // Left wins; ignore the incoming frame and keep waiting for our ACK.
            info!(
                target: "account",
                "simultaneous proposal at h={}: we are left, holding ours",
                expected_height
            );
            return Ok(None);
        }
        // Right rolls back: pending transactions return to the mempool head.
        if let Some(pending) = machine.pending_frame.take() {
            let mut restored = pending.frame.account_txs;
            restored.append(&mut machine.mempool);
            machine.mempool = restored;
        }
        machine.pending_is_ours = false;
        machine.sent_transitions = 0;
        info!(
            target: "account",
            "simultaneous proposal at h={}: we are right, rolled back",
            expected_height
        );
    }

    // The proposer must have signed its own frame.
    let signed = msg
        .new_signatures
        .iter()
        .any(|sig| verify_signature(&machine.peer_pubkey, &new_frame.state_hash, sig).is_ok());
    if !signed {
        return Err(AccountError::BadSignature);
    }

    // Replay the frame and insist on bitwise agreement.
    let mut scratch = Scratch::from_parts(&machine.deltas, &machine.htlcs);
    let (accepted, rejected) =
        apply_frame_txs(&mut scratch, &new_frame.account_txs, new_frame.timestamp);
    if !rejected.is_empty() {
        return Err(AccountError::InvariantViolated(format!(
            "frame contains {} invalid txs",
            rejected.len()
        )));
    }
    let (token_ids, delta_sums) = scratch.delta_sums();
    let recomputed = frame_state_hash(
        new_frame.height,
        new_frame.timestamp,
        &new_frame.prev_frame_hash,
        &accepted,
        &token_ids,
        &delta_sums,
    );
    if recomputed != new_frame.state_hash
        || token_ids != new_frame.token_ids
        || delta_sums != new_frame.delta_sums
    {
        return Err(AccountError::InvariantViolated(
            "state hash divergence on received frame".into(),
        ));
    }

    let our_sig = key
        .sign(&new_frame.state_hash)
        .map_err(|_| AccountError::BadSignature)?;

    // Countersigning completes 2-of-2: commit immediately.
    machine.height = new_frame.height;
    machine.deltas = scratch.deltas;
    machine.htlcs = scratch.htlcs;
    machine.current_frame = new_frame.clone();
    info!(
        target: "account",
        "committed frame h={} (countersigned) with {} at t={}",
        machine.height,
        machine.counterparty,
        now
    );

    machine.counter_out += 1;
    Ok(Some(AccountInput {
        from: machine.ours,
        to: machine.counterparty,
        height: machine.height,
        new_frame: None,
        new_signatures: vec![],
        prev_signatures: vec![our_sig],
        counter: machine.counter_out,
    }))
}
