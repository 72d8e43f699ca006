// Path: crates/entity/src/reducer.rs

//! The entity transaction reducer.
//!
//! Each transaction is applied to a working copy of the state; a rejected
//! transaction rolls the copy back and is excluded from the frame, never
//! poisoning its neighbors. Side effects (bilateral messages, settlement
//! batches) are returned as [`EntityOutput`] values.
//!
//! Determinism: every replica of an entity holds the same shared account key
//! and replays the same transactions at the same frame timestamp, so the
//! account machines inside the state evolve identically everywhere.

use tracing::{debug, warn};
use xln_account::machine as account_machine;
use xln_crypto::signer::SignerKey;
use xln_types::account::{AccountInput, AccountMachine, AccountTx};
use xln_types::entity::{
    EntityState, EntityTx, SwapOffer, WithdrawalRequest, MAX_ENTITY_MESSAGES,
};
use xln_types::error::TransactionError;
use xln_types::primitives::{EntityId, Side};
use xln_types::server::Input;
use xln_types::settlement::{
    BatchSubmission, DisputeStart, Hanko, JEvent, ReserveToExternalToken,
    ReserveToReserve as ReserveToReserveOp, SettlementDiff,
};

use crate::keyring::EntityKeyring;

/// A side effect produced by entity consensus, drained by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutput {
    /// A consensus message to another replica of this entity.
    Consensus(Input),
    /// A bilateral wire message to a counterparty entity.
    AccountMessage {
        /// Receiving entity.
        to: EntityId,
        /// The message.
        input: AccountInput,
    },
    /// An authorized settlement batch bound for the jurisdiction.
    SubmitBatch(BatchSubmission),
}

fn push_message(state: &mut EntityState, message: String) {
    state.messages.push(message);
    if state.messages.len() > MAX_ENTITY_MESSAGES {
        let excess = state.messages.len() - MAX_ENTITY_MESSAGES;
        state.messages.drain(..excess);
    }
}

fn check_and_bump_nonce(state: &mut EntityState, tx: &EntityTx) -> Result<(), TransactionError> {
    if let Some(header) = tx.header() {
        let stored = state.nonces.get(&header.signer).copied().unwrap_or(0);
        let expected = stored + 1;
        if header.nonce != expected {
            return Err(TransactionError::NonceOutOfOrder {
                expected,
                got: header.nonce,
            });
        }
        state.nonces.insert(header.signer, header.nonce);
    }
    Ok(())
}

/// Queues an account transaction and proposes a frame if the machine is free.
fn enqueue_and_flush(
    machine: &mut AccountMachine,
    tx: AccountTx,
    timestamp: u64,
    account_key: &SignerKey,
    outputs: &mut Vec<EntityOutput>,
) -> Result<(), TransactionError> {
    machine.mempool.push(tx);
    flush_account(machine, timestamp, account_key, outputs)
}

/// Proposes on a machine when it has work and no outstanding frame.
fn flush_account(
    machine: &mut AccountMachine,
    timestamp: u64,
    account_key: &SignerKey,
    outputs: &mut Vec<EntityOutput>,
) -> Result<(), TransactionError> {
    if let Some(msg) = account_machine::propose(machine, timestamp, account_key)? {
        outputs.push(EntityOutput::AccountMessage {
            to: machine.counterparty,
            input: msg,
        });
    }
    Ok(())
}

fn account_of<'a>(
    state: &'a mut EntityState,
    counterparty: &EntityId,
) -> Result<&'a mut AccountMachine, TransactionError> {
    state.accounts.get_mut(counterparty).ok_or_else(|| {
        TransactionError::MissingState(format!("no account with {}", counterparty))
    })
}

/// Routes a settlement event's per-token absolutes into the account with the
/// pair's other side.
fn route_settlement_diffs(
    entity: EntityId,
    state: &mut EntityState,
    left: EntityId,
    right: EntityId,
    diffs: &[SettlementDiff],
    timestamp: u64,
    account_key: &SignerKey,
    outputs: &mut Vec<EntityOutput>,
) -> Result<(), TransactionError> {
    let counterparty = if entity == left {
        right
    } else if entity == right {
        left
    } else {
        return Err(TransactionError::MissingState(
            "settlement event does not involve this entity".into(),
        ));
    };
    let machine = account_of(state, &counterparty)?;
    for diff in diffs {
        machine.mempool.push(AccountTx::ReserveToCollateral {
            token_id: diff.token_id,
            collateral: diff.collateral,
            ondelta: diff.ondelta,
        });
    }
    flush_account(machine, timestamp, account_key, outputs)
}

/// Applies one transaction to `state`, appending side effects to `outputs`.
pub fn apply_entity_tx(
    entity: EntityId,
    state: &mut EntityState,
    tx: &EntityTx,
    keyring: &EntityKeyring,
    outputs: &mut Vec<EntityOutput>,
) -> Result<(), TransactionError> {
    check_and_bump_nonce(state, tx)?;
    let timestamp = state.timestamp;

    match tx {
        EntityTx::ImportReplica { config, .. } => {
            if config.validators.is_empty() {
                return Err(TransactionError::InvariantViolated(
                    "empty validator set".into(),
                ));
            }
            let total = config.total_shares();
            if config.threshold == 0 || config.threshold > total {
                return Err(TransactionError::InvariantViolated(format!(
                    "threshold {} outside (0, {}]",
                    config.threshold, total
                )));
            }
            if config.validators.iter().any(|v| v.shares == 0) {
                return Err(TransactionError::InvariantViolated(
                    "zero-share validator".into(),
                ));
            }
            state.config = config.clone();
            push_message(state, format!("board adopted: {} validators", config.validators.len()));
            Ok(())
        }

        EntityTx::OpenAccount {
            counterparty,
            peer_pubkey,
            ..
        } => {
            if *counterparty == entity {
                return Err(TransactionError::InvariantViolated(
                    "cannot open account with self".into(),
                ));
            }
            if let Some(existing) = state.accounts.get(counterparty) {
                // Opening is once per pair; a repeat with the same key is a no-op.
                if existing.peer_pubkey == *peer_pubkey {
                    return Ok(());
                }
                return Err(TransactionError::InvariantViolated(
                    "account already open with a different key".into(),
                ));
            }
            state.accounts.insert(
                *counterparty,
                AccountMachine::new(entity, *counterparty, peer_pubkey.clone()),
            );
            push_message(state, format!("account opened with {}", counterparty));
            Ok(())
        }

        EntityTx::DirectPayment {
            counterparty,
            token_id,
            amount,
            route_hint,
            ..
        } => {
            let our_side = Side::of(&entity, counterparty);
            let signed = match our_side {
                Side::Left => *amount as i128,
                Side::Right => -(*amount as i128),
            };
            let machine = account_of(state, counterparty)?;
            enqueue_and_flush(
                machine,
                AccountTx::DirectPayment {
                    token_id: *token_id,
                    amount: signed,
                    route_hint: route_hint.clone(),
                },
                timestamp,
                &keyring.account_key,
                outputs,
            )
        }

        EntityTx::HtlcPayment {
            counterparty,
            token_id,
            amount,
            hash_lock,
            timeout,
            route,
            ..
        } => {
            let sender = Side::of(&entity, counterparty);
            let machine = account_of(state, counterparty)?;
            enqueue_and_flush(
                machine,
                AccountTx::HtlcPayment {
                    token_id: *token_id,
                    amount: *amount,
                    hash_lock: *hash_lock,
                    timeout: *timeout,
                    sender,
                    route: route.clone(),
                },
                timestamp,
                &keyring.account_key,
                outputs,
            )
        }

        EntityTx::ReserveToReserve {
            to,
            token_id,
            amount,
            ..
        } => {
            let reserve = state.reserves.get(token_id).copied().unwrap_or(0);
            if reserve < *amount {
                return Err(TransactionError::InvariantViolated(format!(
                    "reserve {} below transfer {}",
                    reserve, amount
                )));
            }
            // Deducted optimistically; the chain's ReserveUpdated event will
            // overwrite with the authoritative absolute.
            state.reserves.insert(*token_id, reserve - amount);
            state.pending_batch.reserve_to_reserve.push(ReserveToReserveOp {
                to: *to,
                token_id: *token_id,
                amount: *amount,
            });
            Ok(())
        }

        EntityTx::RequestWithdrawal {
            token_id, amount, ..
        } => {
            state.withdrawals.push(WithdrawalRequest {
                token_id: *token_id,
                amount: *amount,
                requested_at: timestamp,
            });
            state
                .pending_batch
                .reserve_to_external_token
                .push(ReserveToExternalToken {
                    to: entity.as_ref().to_vec(),
                    token_id: *token_id,
                    amount: *amount,
                });
            Ok(())
        }

        EntityTx::StartDispute { counterparty, .. } => {
            let proof_hash = account_of(state, counterparty)?.current_frame.state_hash;
            state.disputes.insert(*counterparty, timestamp);
            state.pending_batch.dispute_starts.push(DisputeStart {
                counterparty: *counterparty,
                proof_hash,
            });
            push_message(state, format!("dispute started with {}", counterparty));
            Ok(())
        }

        EntityTx::JBroadcast { payload, .. } => {
            if state.pending_batch.is_empty() && payload.is_empty() {
                return Err(TransactionError::InvariantViolated(
                    "nothing to broadcast".into(),
                ));
            }
            let batch = std::mem::take(&mut state.pending_batch);
            if !batch.is_empty() {
                // The hanko signature is filled in at commit from the frame's
                // aggregate: the quorum that committed this frame is the
                // quorum that authorized the batch.
                outputs.push(EntityOutput::SubmitBatch(BatchSubmission {
                    entity,
                    batch,
                    hanko: Hanko {
                        entity,
                        sig: Vec::new(),
                    },
                }));
            }
            push_message(state, format!("batch broadcast ({} byte memo)", payload.len()));
            Ok(())
        }

        EntityTx::ProfileUpdate { profile, .. } => {
            state.profile = profile.clone();
            Ok(())
        }

        EntityTx::PlaceSwapOffer {
            header,
            give_token,
            give_amount,
            want_token,
            want_amount,
        } => {
            if *give_amount == 0 || *want_amount == 0 {
                return Err(TransactionError::InvariantViolated("zero swap leg".into()));
            }
            let id = state.next_offer_id;
            state.swap_offers.insert(
                id,
                SwapOffer {
                    id,
                    owner: header.signer,
                    give_token: *give_token,
                    give_amount: *give_amount,
                    want_token: *want_token,
                    want_amount: *want_amount,
                },
            );
            state.next_offer_id += 1;
            Ok(())
        }

        EntityTx::CancelSwapOffer { header, offer_id } => {
            let offer = state
                .swap_offers
                .get(offer_id)
                .ok_or_else(|| TransactionError::MissingState(format!("offer {}", offer_id)))?;
            if offer.owner != header.signer {
                return Err(TransactionError::Unauthorized(
                    "only the placing signer may cancel".into(),
                ));
            }
            state.swap_offers.remove(offer_id);
            Ok(())
        }

        EntityTx::SetAccountLimit {
            counterparty,
            token_id,
            amount,
            ..
        } => {
            let our_side = Side::of(&entity, counterparty);
            let machine = account_of(state, counterparty)?;
            machine.mempool.push(AccountTx::AddDelta {
                token_id: *token_id,
            });
            enqueue_and_flush(
                machine,
                AccountTx::SetCreditLimit {
                    token_id: *token_id,
                    amount: *amount,
                    side: our_side,
                },
                timestamp,
                &keyring.account_key,
                outputs,
            )
        }

        EntityTx::RevealSecret {
            counterparty,
            preimage,
            ..
        } => {
            let machine = account_of(state, counterparty)?;
            enqueue_and_flush(
                machine,
                AccountTx::RevealSecret {
                    preimage: preimage.clone(),
                },
                timestamp,
                &keyring.account_key,
                outputs,
            )
        }

        EntityTx::AccountInput { input } => {
            let machine = account_of(state, &input.from)?;
            // Message-level failures (replay, broken chain, bad signature)
            // drop the message but keep the transaction: the error semantics
            // in `receive` leave the machine in the documented state, and a
            // rejected transaction would also roll back the counter advance
            // and wedge the direction forever.
            match account_machine::receive(machine, input, timestamp, &keyring.account_key) {
                Ok(Some(reply)) => outputs.push(EntityOutput::AccountMessage {
                    to: input.from,
                    input: reply,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        target: "entity",
                        "account message from {} dropped: {}",
                        input.from,
                        e
                    );
                }
            }
            // A rollback or a commit may have freed the machine for queued work.
            flush_account(machine, timestamp, &keyring.account_key, outputs)
        }

        EntityTx::ImportJ { event } => match event {
            JEvent::EntityRegistered { entity: who, number, .. } => {
                push_message(state, format!("jurisdiction registered {} as #{}", who, number));
                Ok(())
            }
            JEvent::ReserveUpdated {
                entity: who,
                token_id,
                new_amount,
            } => {
                if *who != entity {
                    return Err(TransactionError::MissingState(
                        "reserve event does not involve this entity".into(),
                    ));
                }
                // Absolute override; applying twice is a no-op by construction.
                state.reserves.insert(*token_id, *new_amount);
                debug!(
                    target: "entity",
                    "reserve override token={} amount={}",
                    token_id.0,
                    new_amount
                );
                Ok(())
            }
            JEvent::ReserveToCollateral {
                left,
                right,
                token_id,
                collateral,
                ondelta,
            } => route_settlement_diffs(
                entity,
                state,
                *left,
                *right,
                &[SettlementDiff {
                    token_id: *token_id,
                    collateral: *collateral,
                    ondelta: *ondelta,
                }],
                timestamp,
                &keyring.account_key,
                outputs,
            ),
            JEvent::SettlementProcessed { left, right, diffs } => route_settlement_diffs(
                entity,
                state,
                *left,
                *right,
                diffs,
                timestamp,
                &keyring.account_key,
                outputs,
            ),
            JEvent::DisputeStarted {
                left,
                right,
                dispute_nonce,
            } => {
                let counterparty = if entity == *left { *right } else { *left };
                state.disputes.insert(counterparty, timestamp);
                push_message(
                    state,
                    format!("dispute #{} opened on-chain with {}", dispute_nonce, counterparty),
                );
                Ok(())
            }
            JEvent::DisputeFinalized { left, right, diffs } => {
                let counterparty = if entity == *left { *right } else { *left };
                state.disputes.remove(&counterparty);
                route_settlement_diffs(
                    entity,
                    state,
                    *left,
                    *right,
                    diffs,
                    timestamp,
                    &keyring.account_key,
                    outputs,
                )
            }
        },
    }
}

/// Applies a transaction list over `state` at `timestamp`, atomically per
/// transaction.
///
/// Returns the post-state, the accepted transactions (the frame content),
/// the rejects, and the side effects of the accepted set. The post-state's
/// height is bumped by one.
pub fn apply_frame_txs(
    entity: EntityId,
    state: &EntityState,
    txs: &[EntityTx],
    timestamp: u64,
    keyring: &EntityKeyring,
) -> (
    EntityState,
    Vec<EntityTx>,
    Vec<(EntityTx, TransactionError)>,
    Vec<EntityOutput>,
) {
    let mut working = state.clone();
    working.timestamp = timestamp;
    let mut accepted = Vec::with_capacity(txs.len());
    let mut rejected = Vec::new();
    let mut outputs = Vec::new();

    for tx in txs {
        let mut candidate = working.clone();
        let mut tx_outputs = Vec::new();
        match apply_entity_tx(entity, &mut candidate, tx, keyring, &mut tx_outputs) {
            Ok(()) => {
                working = candidate;
                outputs.append(&mut tx_outputs);
                accepted.push(tx.clone());
            }
            Err(e) => {
                warn!(target: "entity", "tx rejected: kind={} err={}", tx.kind(), e);
                rejected.push((tx.clone(), e));
            }
        }
    }

    working.height += 1;
    (working, accepted, rejected, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_crypto::signer::TestSigner;
    use xln_types::entity::{Profile, QuorumConfig, TxHeader, ValidatorRecord};
    use xln_types::primitives::{SignerIdx, TokenId};

    fn keyring() -> EntityKeyring {
        EntityKeyring::new(
            SignerKey::Test(TestSigner::seeded(100)),
            SignerKey::Test(TestSigner::seeded(200)),
        )
    }

    fn header(nonce: u64) -> TxHeader {
        TxHeader {
            signer: SignerIdx(0),
            nonce,
        }
    }

    fn base_state() -> EntityState {
        EntityState {
            config: QuorumConfig {
                threshold: 1,
                validators: vec![ValidatorRecord {
                    signer: SignerIdx(0),
                    pubkey: TestSigner::seeded(0).public_bytes().to_vec(),
                    shares: 1,
                }],
            },
            ..Default::default()
        }
    }

    #[test]
    fn nonce_must_increase_strictly() {
        let entity = EntityId::from_index(1);
        let mut state = base_state();
        let mut outputs = Vec::new();
        let tx = EntityTx::ProfileUpdate {
            header: header(1),
            profile: Profile::default(),
        };
        apply_entity_tx(entity, &mut state, &tx, &keyring(), &mut outputs).unwrap();
        let err =
            apply_entity_tx(entity, &mut state, &tx, &keyring(), &mut outputs).unwrap_err();
        assert!(matches!(err, TransactionError::NonceOutOfOrder { expected: 2, got: 1 }));
    }

    #[test]
    fn rejected_tx_does_not_poison_the_frame() {
        let entity = EntityId::from_index(1);
        let state = base_state();
        let txs = vec![
            EntityTx::ProfileUpdate {
                header: header(1),
                profile: Profile {
                    name: "hub".into(),
                    ..Default::default()
                },
            },
            // Wrong nonce: rejected.
            EntityTx::ProfileUpdate {
                header: header(5),
                profile: Profile::default(),
            },
            EntityTx::ProfileUpdate {
                header: header(2),
                profile: Profile {
                    name: "hub-2".into(),
                    ..Default::default()
                },
            },
        ];
        let (post, accepted, rejected, _) =
            apply_frame_txs(entity, &state, &txs, 10, &keyring());
        assert_eq!(accepted.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(post.profile.name, "hub-2");
        assert_eq!(post.height, 1);
    }

    #[test]
    fn open_account_is_idempotent_per_key() {
        let entity = EntityId::from_index(1);
        let peer = EntityId::from_index(2);
        let mut state = base_state();
        let mut outputs = Vec::new();
        let open = EntityTx::OpenAccount {
            header: header(1),
            counterparty: peer,
            peer_pubkey: vec![1, 2, 3],
        };
        apply_entity_tx(entity, &mut state, &open, &keyring(), &mut outputs).unwrap();
        let reopen = EntityTx::OpenAccount {
            header: header(2),
            counterparty: peer,
            peer_pubkey: vec![1, 2, 3],
        };
        apply_entity_tx(entity, &mut state, &reopen, &keyring(), &mut outputs).unwrap();
        let conflicting = EntityTx::OpenAccount {
            header: header(3),
            counterparty: peer,
            peer_pubkey: vec![9],
        };
        assert!(
            apply_entity_tx(entity, &mut state, &conflicting, &keyring(), &mut outputs).is_err()
        );
        assert_eq!(state.accounts.len(), 1);
    }

    #[test]
    fn direct_payment_emits_account_message() {
        let entity = EntityId::from_index(1);
        let peer = EntityId::from_index(2);
        let mut state = base_state();
        state.timestamp = 5;
        let mut outputs = Vec::new();
        let kr = keyring();

        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::OpenAccount {
                header: header(1),
                counterparty: peer,
                peer_pubkey: TestSigner::seeded(201).public_bytes().to_vec(),
            },
            &kr,
            &mut outputs,
        )
        .unwrap();

        // Seed the ledger so the payment has capacity.
        let machine = state.accounts.get_mut(&peer).unwrap();
        machine.mempool.push(AccountTx::AddDelta {
            token_id: TokenId(1),
        });
        machine.mempool.push(AccountTx::SetCreditLimit {
            token_id: TokenId(1),
            amount: 1_000,
            side: Side::Right,
        });

        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::DirectPayment {
                header: header(2),
                counterparty: peer,
                token_id: TokenId(1),
                amount: 100,
                route_hint: vec![],
            },
            &kr,
            &mut outputs,
        )
        .unwrap();

        assert!(matches!(
            outputs.last(),
            Some(EntityOutput::AccountMessage { to, .. }) if *to == peer
        ));
    }

    #[test]
    fn reserve_transfer_needs_funds() {
        let entity = EntityId::from_index(1);
        let mut state = base_state();
        let mut outputs = Vec::new();
        let tx = EntityTx::ReserveToReserve {
            header: header(1),
            to: EntityId::from_index(2),
            token_id: TokenId(1),
            amount: 50,
        };
        assert!(apply_entity_tx(entity, &mut state, &tx, &keyring(), &mut outputs).is_err());

        // The failed apply above still burned nonce 1 (atomicity is the
        // frame layer's job); continue with nonce 2.
        state.reserves.insert(TokenId(1), 80);
        let tx = EntityTx::ReserveToReserve {
            header: header(2),
            to: EntityId::from_index(2),
            token_id: TokenId(1),
            amount: 50,
        };
        apply_entity_tx(entity, &mut state, &tx, &keyring(), &mut outputs).unwrap();
        assert_eq!(state.reserves[&TokenId(1)], 30);
        assert_eq!(state.pending_batch.reserve_to_reserve.len(), 1);
    }

    #[test]
    fn swap_offers_place_and_cancel() {
        let entity = EntityId::from_index(1);
        let mut state = base_state();
        let mut outputs = Vec::new();
        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::PlaceSwapOffer {
                header: header(1),
                give_token: TokenId(1),
                give_amount: 10,
                want_token: TokenId(2),
                want_amount: 20,
            },
            &keyring(),
            &mut outputs,
        )
        .unwrap();
        assert_eq!(state.swap_offers.len(), 1);

        // A different signer may not cancel.
        let foreign_cancel = EntityTx::CancelSwapOffer {
            header: TxHeader {
                signer: SignerIdx(1),
                nonce: 1,
            },
            offer_id: 0,
        };
        assert!(
            apply_entity_tx(entity, &mut state, &foreign_cancel, &keyring(), &mut outputs)
                .is_err()
        );

        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::CancelSwapOffer {
                header: header(2),
                offer_id: 0,
            },
            &keyring(),
            &mut outputs,
        )
        .unwrap();
        assert!(state.swap_offers.is_empty());
    }

    #[test]
    fn reserve_update_is_absolute_and_idempotent() {
        let entity = EntityId::from_index(1);
        let mut state = base_state();
        let mut outputs = Vec::new();
        let event = EntityTx::ImportJ {
            event: JEvent::ReserveUpdated {
                entity,
                token_id: TokenId(1),
                new_amount: 700,
            },
        };
        apply_entity_tx(entity, &mut state, &event, &keyring(), &mut outputs).unwrap();
        apply_entity_tx(entity, &mut state, &event, &keyring(), &mut outputs).unwrap();
        assert_eq!(state.reserves[&TokenId(1)], 700);
    }

    #[test]
    fn batch_flush_carries_pending_ops() {
        let entity = EntityId::from_index(1);
        let mut state = base_state();
        state.reserves.insert(TokenId(1), 100);
        let mut outputs = Vec::new();
        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::ReserveToReserve {
                header: header(1),
                to: EntityId::from_index(2),
                token_id: TokenId(1),
                amount: 40,
            },
            &keyring(),
            &mut outputs,
        )
        .unwrap();
        apply_entity_tx(
            entity,
            &mut state,
            &EntityTx::JBroadcast {
                header: header(2),
                payload: vec![],
            },
            &keyring(),
            &mut outputs,
        )
        .unwrap();
        assert!(state.pending_batch.is_empty());
        assert!(matches!(
            outputs.last(),
            Some(EntityOutput::SubmitBatch(s)) if s.batch.reserve_to_reserve.len() == 1
        ));
    }
}
