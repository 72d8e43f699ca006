// Path: crates/account/src/apply.rs

//! Validate-then-apply transaction processing for bilateral accounts.
//!
//! Transactions are applied to a [`Scratch`] copy of the ledger; a rejected
//! transaction leaves the scratch untouched and is simply not included in
//! the frame. Committing a frame swaps the scratch in wholesale, so invariant
//! checks always run before any durable mutation.
//!
//! Frame semantics: applying a frame at timestamp `t` first sweeps HTLCs with
//! `timeout <= t` (refunding their senders), then applies the frame's
//! transactions in order. Both sides perform the same sweep from the same
//! frame timestamp, keeping the ledgers bit-identical.

use crate::delta::{derive_capacity, within_credit_band};
use tracing::debug;
use xln_crypto::{keccak256, sha256};
use xln_types::account::{AccountTx, Delta, Htlc};
use xln_types::error::AccountError;
use xln_types::primitives::{Hash32, Side, TokenId};
use std::collections::BTreeMap;

/// A mutable working copy of an account's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scratch {
    /// Per-token ledgers.
    pub deltas: BTreeMap<TokenId, Delta>,
    /// In-flight conditional obligations.
    pub htlcs: BTreeMap<Hash32, Htlc>,
}

impl Scratch {
    /// Snapshots the live ledger of a machine.
    pub fn from_parts(deltas: &BTreeMap<TokenId, Delta>, htlcs: &BTreeMap<Hash32, Htlc>) -> Self {
        Self {
            deltas: deltas.clone(),
            htlcs: htlcs.clone(),
        }
    }

    /// `ondelta + offdelta` per token, aligned with sorted token ids.
    pub fn delta_sums(&self) -> (Vec<TokenId>, Vec<i128>) {
        let token_ids: Vec<TokenId> = self.deltas.keys().copied().collect();
        let sums = self.deltas.values().map(Delta::sum).collect();
        (token_ids, sums)
    }
}

/// Deterministic identifier of an HTLC: one lock per `(token, hash_lock,
/// sender)` may be in flight at a time.
pub fn htlc_id(token_id: TokenId, hash_lock: &Hash32, sender: Side) -> Hash32 {
    let mut preimage = Vec::with_capacity(4 + 32 + 1);
    preimage.extend_from_slice(&token_id.0.to_be_bytes());
    preimage.extend_from_slice(hash_lock);
    preimage.push(match sender {
        Side::Left => 0,
        Side::Right => 1,
    });
    keccak256(preimage)
}

/// Amount currently locked by `side` across in-flight HTLCs for `token_id`.
fn locked_by(scratch: &Scratch, token_id: TokenId, side: Side) -> u128 {
    scratch
        .htlcs
        .values()
        .filter(|h| h.token_id == token_id && h.sender == side)
        .map(|h| h.amount)
        .sum()
}

/// Spendable headroom of `side` for `token_id`, net of its HTLC locks.
pub fn spendable(scratch: &Scratch, token_id: TokenId, side: Side) -> Result<u128, AccountError> {
    let delta = scratch
        .deltas
        .get(&token_id)
        .ok_or_else(|| AccountError::InvariantViolated(format!("unknown token {}", token_id.0)))?;
    let view = derive_capacity(delta, side);
    Ok(view.in_capacity.saturating_sub(locked_by(scratch, token_id, side)))
}

fn shift_offdelta(
    scratch: &mut Scratch,
    token_id: TokenId,
    amount: i128,
) -> Result<(), AccountError> {
    let payer = if amount >= 0 { Side::Left } else { Side::Right };
    let available = spendable(scratch, token_id, payer)?;
    if amount.unsigned_abs() > available {
        return Err(AccountError::InvariantViolated(format!(
            "payment of {} exceeds spendable {} for {:?}",
            amount.unsigned_abs(),
            available,
            payer
        )));
    }
    // spendable() proved the record exists.
    let delta = scratch
        .deltas
        .get_mut(&token_id)
        .ok_or_else(|| AccountError::InvariantViolated(format!("unknown token {}", token_id.0)))?;
    delta.offdelta += amount;
    Ok(())
}

/// Removes expired HTLCs, refunding their senders. Runs at the head of every
/// frame application; a reveal at `timestamp == timeout` loses to the sweep.
pub fn sweep_expired_htlcs(scratch: &mut Scratch, timestamp: u64) {
    let expired: Vec<Hash32> = scratch
        .htlcs
        .iter()
        .filter(|(_, h)| h.timeout <= timestamp)
        .map(|(id, _)| *id)
        .collect();
    for id in expired {
        if let Some(htlc) = scratch.htlcs.remove(&id) {
            debug!(
                target: "account",
                "htlc expired, refunding sender: lock={} amount={}",
                hex::encode(htlc.hash_lock),
                htlc.amount
            );
        }
    }
}

/// Applies one transaction to the scratch, or rejects it without effect.
pub fn apply_tx(
    scratch: &mut Scratch,
    tx: &AccountTx,
    timestamp: u64,
) -> Result<(), AccountError> {
    match tx {
        AccountTx::DirectPayment {
            token_id, amount, ..
        } => {
            if *amount == 0 {
                return Err(AccountError::InvariantViolated("zero payment".into()));
            }
            shift_offdelta(scratch, *token_id, *amount)
        }
        AccountTx::HtlcPayment {
            token_id,
            amount,
            hash_lock,
            timeout,
            sender,
            ..
        } => {
            if *amount == 0 {
                return Err(AccountError::InvariantViolated("zero htlc".into()));
            }
            if *timeout <= timestamp {
                return Err(AccountError::InvariantViolated(
                    "htlc timeout not in the future".into(),
                ));
            }
            let available = spendable(scratch, *token_id, *sender)?;
            if *amount > available {
                return Err(AccountError::InvariantViolated(format!(
                    "htlc of {} exceeds spendable {}",
                    amount, available
                )));
            }
            let id = htlc_id(*token_id, hash_lock, *sender);
            if scratch.htlcs.contains_key(&id) {
                return Err(AccountError::InvariantViolated(
                    "duplicate hash lock in flight".into(),
                ));
            }
            scratch.htlcs.insert(
                id,
                Htlc {
                    id,
                    token_id: *token_id,
                    amount: *amount,
                    hash_lock: *hash_lock,
                    timeout: *timeout,
                    sender: *sender,
                },
            );
            Ok(())
        }
        AccountTx::RevealSecret { preimage } => {
            let lock = sha256(preimage)
                .map_err(|e| AccountError::InvariantViolated(e.to_string()))?;
            let matching: Vec<Hash32> = scratch
                .htlcs
                .iter()
                .filter(|(_, h)| h.hash_lock == lock && timestamp < h.timeout)
                .map(|(id, _)| *id)
                .collect();
            if matching.is_empty() {
                return Err(AccountError::InvariantViolated(
                    "no live htlc matches preimage".into(),
                ));
            }
            for id in matching {
                if let Some(htlc) = scratch.htlcs.remove(&id) {
                    let amount = htlc.amount as i128;
                    let shift = match htlc.sender {
                        Side::Left => amount,
                        Side::Right => -amount,
                    };
                    // The lock already reserved this headroom; apply directly.
                    let delta = scratch.deltas.get_mut(&htlc.token_id).ok_or_else(|| {
                        AccountError::InvariantViolated(format!(
                            "unknown token {}",
                            htlc.token_id.0
                        ))
                    })?;
                    delta.offdelta += shift;
                }
            }
            Ok(())
        }
        AccountTx::SetCreditLimit {
            token_id,
            amount,
            side,
        } => {
            let delta = scratch.deltas.get_mut(token_id).ok_or_else(|| {
                AccountError::InvariantViolated(format!("unknown token {}", token_id.0))
            })?;
            let mut updated = delta.clone();
            match side {
                Side::Left => updated.left_credit_limit = *amount,
                Side::Right => updated.right_credit_limit = *amount,
            }
            // A limit may not be pulled below credit already drawn.
            if !within_credit_band(&updated) {
                return Err(AccountError::InvariantViolated(
                    "credit limit below drawn credit".into(),
                ));
            }
            *delta = updated;
            Ok(())
        }
        AccountTx::ReserveToCollateral {
            token_id,
            collateral,
            ondelta,
        } => {
            // Settlement values are authoritative absolutes; never added.
            let delta = scratch.deltas.entry(*token_id).or_default();
            delta.collateral = *collateral;
            delta.ondelta = *ondelta;
            Ok(())
        }
        AccountTx::AddDelta { token_id } => {
            // Idempotent: an existing record is left untouched.
            scratch.deltas.entry(*token_id).or_default();
            Ok(())
        }
    }
}

/// Sweeps expired HTLCs, then applies `txs` in order, rejecting (and
/// reporting) the ones that fail. Returns the accepted transactions.
pub fn apply_frame_txs(
    scratch: &mut Scratch,
    txs: &[AccountTx],
    timestamp: u64,
) -> (Vec<AccountTx>, Vec<(AccountTx, AccountError)>) {
    sweep_expired_htlcs(scratch, timestamp);
    let mut accepted = Vec::with_capacity(txs.len());
    let mut rejected = Vec::new();
    for tx in txs {
        match apply_tx(scratch, tx, timestamp) {
            Ok(()) => accepted.push(tx.clone()),
            Err(e) => rejected.push((tx.clone(), e)),
        }
    }
    (accepted, rejected)
}
