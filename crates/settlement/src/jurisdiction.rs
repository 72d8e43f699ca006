// Path: crates/settlement/src/jurisdiction.rs

//! The jurisdiction ledger mirror.
//!
//! Holds registered entities, per-token reserves, per-channel collateral and
//! the FIFO debt queues, processes authorized batches, and emits the event
//! stream the runtime's watcher feeds back into entity consensus. Every
//! reserve credit passes through debt enforcement before it lands.

use crate::debts::{enforce_debts, DebtQueue};
use std::collections::BTreeMap;
use tracing::{debug, info};
use xln_crypto::channel_key;
use xln_types::error::SettlementError;
use xln_types::primitives::{ordered_pair, EntityId, Hash32, TokenId};
use xln_types::settlement::{BatchSubmission, Debt, JEvent, SettlementDiff};

/// Registration record of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    /// Sequential registration number.
    pub number: u64,
    /// Hash of the entity's governing board.
    pub board_hash: Hash32,
    /// Block at which the registration activated.
    pub activation_block: u64,
}

/// The mirrored jurisdiction state.
#[derive(Debug, Clone, Default)]
pub struct Jurisdiction {
    /// Current block number, advanced by the host.
    pub block: u64,
    /// Token ids registered, ascending.
    tokens: Vec<TokenId>,
    entities: BTreeMap<EntityId, EntityInfo>,
    reserves: BTreeMap<(EntityId, TokenId), u128>,
    collaterals: BTreeMap<(Hash32, TokenId), (u128, i128)>,
    debts: BTreeMap<(EntityId, TokenId), DebtQueue>,
    dispute_nonces: BTreeMap<Hash32, u64>,
    revealed_secrets: BTreeMap<Hash32, Vec<u8>>,
    events: Vec<JEvent>,
}

impl Jurisdiction {
    /// A fresh, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token and returns its id.
    pub fn register_token(&mut self) -> TokenId {
        let id = TokenId(self.tokens.len() as u32 + 1);
        self.tokens.push(id);
        id
    }

    /// Number of registered tokens.
    pub fn get_tokens_length(&self) -> u32 {
        self.tokens.len() as u32
    }

    /// Registers an entity and emits `EntityRegistered`.
    pub fn register_entity(&mut self, entity: EntityId, board_hash: Hash32) -> u64 {
        let number = self.entities.len() as u64 + 1;
        self.entities.insert(
            entity,
            EntityInfo {
                number,
                board_hash,
                activation_block: self.block,
            },
        );
        self.events.push(JEvent::EntityRegistered {
            entity,
            number,
            board_hash,
        });
        info!(target: "jurisdiction", "registered {} as #{}", entity, number);
        number
    }

    /// Registration record of an entity, if any.
    pub fn get_entity_info(&self, entity: &EntityId) -> Option<&EntityInfo> {
        self.entities.get(entity)
    }

    /// Current reserve of `(entity, token)`.
    pub fn reserves(&self, entity: EntityId, token_id: TokenId) -> u128 {
        self.reserves.get(&(entity, token_id)).copied().unwrap_or(0)
    }

    /// Current `(collateral, ondelta)` of a channel key and token.
    pub fn collaterals(&self, key: Hash32, token_id: TokenId) -> (u128, i128) {
        self.collaterals.get(&(key, token_id)).copied().unwrap_or((0, 0))
    }

    /// Outstanding debt queue of `(entity, token)`.
    pub fn debt_queue(&self, entity: EntityId, token_id: TokenId) -> Option<&DebtQueue> {
        self.debts.get(&(entity, token_id))
    }

    /// A secret revealed on-chain for a hash lock, if any.
    pub fn revealed_secret(&self, hash_lock: &Hash32) -> Option<&[u8]> {
        self.revealed_secrets.get(hash_lock).map(Vec::as_slice)
    }

    /// Drains the pending event stream for the watcher.
    pub fn drain_events(&mut self) -> Vec<JEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit_reserve(&mut self, entity: EntityId, token_id: TokenId) {
        let new_amount = self.reserves(entity, token_id);
        self.events.push(JEvent::ReserveUpdated {
            entity,
            token_id,
            new_amount,
        });
    }

    /// Credits a reserve, paying outstanding debts FIFO first.
    fn credit_reserve(&mut self, entity: EntityId, token_id: TokenId, amount: u128) {
        let mut queue = self.debts.remove(&(entity, token_id)).unwrap_or_default();
        let (payments, remaining) = enforce_debts(&mut queue, amount);
        if !queue.debts.is_empty() || queue.debt_index > 0 {
            self.debts.insert((entity, token_id), queue);
        }
        for (creditor, paid) in payments {
            debug!(
                target: "jurisdiction",
                "debt payment {} -> {} of {}",
                entity,
                creditor,
                paid
            );
            *self.reserves.entry((creditor, token_id)).or_default() += paid;
            self.emit_reserve(creditor, token_id);
        }
        if remaining > 0 {
            *self.reserves.entry((entity, token_id)).or_default() += remaining;
        }
        self.emit_reserve(entity, token_id);
    }

    fn debit_reserve(
        &mut self,
        entity: EntityId,
        token_id: TokenId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        let have = self.reserves(entity, token_id);
        if have < amount {
            return Err(SettlementError::InsufficientReserve { have, need: amount });
        }
        self.reserves.insert((entity, token_id), have - amount);
        Ok(())
    }

    /// External deposit into an entity's reserve.
    pub fn deposit(&mut self, entity: EntityId, token_id: TokenId, amount: u128) {
        self.credit_reserve(entity, token_id, amount);
    }

    fn channel(&self, a: EntityId, b: EntityId) -> Result<Hash32, SettlementError> {
        channel_key(a, b).map_err(|_| SettlementError::UnknownChannel)
    }

    fn set_collateral_absolute(
        &mut self,
        a: EntityId,
        b: EntityId,
        diff: &SettlementDiff,
    ) -> Result<(), SettlementError> {
        let key = self.channel(a, b)?;
        self.collaterals
            .insert((key, diff.token_id), (diff.collateral, diff.ondelta));
        Ok(())
    }

    /// Processes an authorized batch, mutating the ledger and queuing events.
    ///
    /// The hanko's aggregate signature is verified by the contract itself;
    /// the mirror requires a known entity and a structurally present
    /// authorization.
    pub fn process_batch(&mut self, submission: &BatchSubmission) -> Result<(), SettlementError> {
        let entity = submission.entity;
        if !self.entities.contains_key(&entity) {
            return Err(SettlementError::UnknownChannel);
        }
        if submission.hanko.sig.is_empty() || submission.hanko.entity != entity {
            return Err(SettlementError::HankoInvalid);
        }
        let batch = &submission.batch;

        for op in &batch.reserve_to_reserve {
            let have = self.reserves(entity, op.token_id);
            let paid = have.min(op.amount);
            let shortfall = op.amount - paid;
            if paid > 0 {
                self.debit_reserve(entity, op.token_id, paid)?;
                self.credit_reserve(op.to, op.token_id, paid);
                self.emit_reserve(entity, op.token_id);
            }
            if shortfall > 0 {
                // An overdrawing transfer books the shortfall as FIFO debt.
                self.debts
                    .entry((entity, op.token_id))
                    .or_default()
                    .debts
                    .push_back(Debt {
                        amount: shortfall,
                        creditor: op.to,
                    });
                debug!(
                    target: "jurisdiction",
                    "debt booked: {} owes {} {}",
                    entity,
                    op.to,
                    shortfall
                );
            }
        }

        for op in &batch.reserve_to_collateral {
            self.debit_reserve(entity, op.token_id, op.amount)?;
            let key = self.channel(entity, op.counterparty)?;
            let (collateral, ondelta) = self.collaterals(key, op.token_id);
            self.collaterals
                .insert((key, op.token_id), (collateral + op.amount, ondelta));
            let (left, right) = ordered_pair(entity, op.counterparty);
            let (new_collateral, new_ondelta) = self.collaterals(key, op.token_id);
            self.events.push(JEvent::ReserveToCollateral {
                left,
                right,
                token_id: op.token_id,
                collateral: new_collateral,
                ondelta: new_ondelta,
            });
            self.emit_reserve(entity, op.token_id);
        }

        for op in &batch.collateral_to_reserve {
            let key = self.channel(entity, op.counterparty)?;
            let (collateral, ondelta) = self.collaterals(key, op.token_id);
            if collateral < op.amount {
                return Err(SettlementError::InsufficientReserve {
                    have: collateral,
                    need: op.amount,
                });
            }
            self.collaterals
                .insert((key, op.token_id), (collateral - op.amount, ondelta));
            self.credit_reserve(entity, op.token_id, op.amount);
            let (left, right) = ordered_pair(entity, op.counterparty);
            self.events.push(JEvent::ReserveToCollateral {
                left,
                right,
                token_id: op.token_id,
                collateral: collateral - op.amount,
                ondelta,
            });
        }

        for op in &batch.settlements {
            let (left, right) = ordered_pair(entity, op.counterparty);
            for diff in &op.diffs {
                self.set_collateral_absolute(left, right, diff)?;
            }
            self.events.push(JEvent::SettlementProcessed {
                left,
                right,
                diffs: op.diffs.clone(),
            });
        }

        for op in &batch.dispute_starts {
            let key = self.channel(entity, op.counterparty)?;
            let nonce = self.dispute_nonces.entry(key).or_default();
            *nonce += 1;
            let (left, right) = ordered_pair(entity, op.counterparty);
            self.events.push(JEvent::DisputeStarted {
                left,
                right,
                dispute_nonce: *nonce,
            });
        }

        for op in &batch.dispute_finalizations {
            let key = self.channel(entity, op.counterparty)?;
            let (left, right) = ordered_pair(entity, op.counterparty);
            let diffs: Vec<SettlementDiff> = self
                .tokens
                .iter()
                .filter_map(|t| {
                    let (collateral, ondelta) = self.collaterals(key, *t);
                    (collateral != 0 || ondelta != 0).then_some(SettlementDiff {
                        token_id: *t,
                        collateral,
                        ondelta,
                    })
                })
                .collect();
            self.events.push(JEvent::DisputeFinalized { left, right, diffs });
        }

        for op in &batch.external_token_to_reserve {
            self.credit_reserve(entity, op.token_id, op.amount);
        }

        for op in &batch.reserve_to_external_token {
            // Withdraw what is available; the contract never overdraws
            // outward, it books nothing and pays less instead.
            let have = self.reserves(entity, op.token_id);
            let paid = have.min(op.amount);
            if paid > 0 {
                self.debit_reserve(entity, op.token_id, paid)?;
                self.emit_reserve(entity, op.token_id);
            }
        }

        for reveal in &batch.reveal_secrets {
            self.revealed_secrets
                .insert(reveal.hash_lock, reveal.secret.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_types::settlement::{
        Batch, Hanko, ReserveToCollateralOp, ReserveToReserve,
    };

    fn submission(entity: EntityId, batch: Batch) -> BatchSubmission {
        BatchSubmission {
            entity,
            batch,
            hanko: Hanko {
                entity,
                sig: vec![1],
            },
        }
    }

    fn setup() -> (Jurisdiction, EntityId, EntityId, TokenId) {
        let mut j = Jurisdiction::new();
        let token = j.register_token();
        let a = EntityId::from_index(1);
        let b = EntityId::from_index(2);
        j.register_entity(a, [1u8; 32]);
        j.register_entity(b, [2u8; 32]);
        (j, a, b, token)
    }

    #[test]
    fn deposit_then_reserve_to_collateral() {
        let (mut j, a, b, token) = setup();
        j.deposit(a, token, 1000);
        assert_eq!(j.reserves(a, token), 1000);

        let batch = Batch {
            reserve_to_collateral: vec![ReserveToCollateralOp {
                counterparty: b,
                token_id: token,
                amount: 500,
            }],
            ..Default::default()
        };
        j.process_batch(&submission(a, batch)).unwrap();
        assert_eq!(j.reserves(a, token), 500);
        let key = channel_key(a, b).unwrap();
        assert_eq!(j.collaterals(key, token), (500, 0));

        let events = j.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            JEvent::ReserveToCollateral { collateral: 500, .. }
        )));
    }

    #[test]
    fn overdrawing_transfer_books_debt_fifo() {
        let (mut j, a, b, token) = setup();
        let c = EntityId::from_index(3);
        j.register_entity(c, [3u8; 32]);
        j.deposit(a, token, 30);

        // Transfer 150 to b with only 30 on hand: 30 paid, 120 booked.
        let batch = Batch {
            reserve_to_reserve: vec![
                ReserveToReserve {
                    to: b,
                    token_id: token,
                    amount: 150,
                },
                ReserveToReserve {
                    to: c,
                    token_id: token,
                    amount: 80,
                },
            ],
            ..Default::default()
        };
        j.process_batch(&submission(a, batch)).unwrap();
        assert_eq!(j.reserves(b, token), 30);
        let queue = j.debt_queue(a, token).unwrap();
        assert_eq!(queue.outstanding(), 200);

        // A 150 deposit pays b in full and c partially, head-first.
        j.drain_events();
        j.deposit(a, token, 150);
        assert_eq!(j.reserves(b, token), 150);
        assert_eq!(j.reserves(c, token), 30);
        assert_eq!(j.reserves(a, token), 0);
        let queue = j.debt_queue(a, token).unwrap();
        assert_eq!(queue.debt_index, 1);
        assert_eq!(queue.outstanding(), 50);
    }

    #[test]
    fn unknown_entity_rejected() {
        let (mut j, _a, _b, token) = setup();
        let ghost = EntityId::from_index(9);
        let err = j
            .process_batch(&submission(
                ghost,
                Batch {
                    reserve_to_reserve: vec![ReserveToReserve {
                        to: EntityId::from_index(1),
                        token_id: token,
                        amount: 1,
                    }],
                    ..Default::default()
                },
            ))
            .unwrap_err();
        assert_eq!(err, SettlementError::UnknownChannel);
    }

    #[test]
    fn empty_hanko_rejected() {
        let (mut j, a, _b, _token) = setup();
        let mut sub = submission(a, Batch::default());
        sub.hanko.sig.clear();
        assert_eq!(j.process_batch(&sub).unwrap_err(), SettlementError::HankoInvalid);
    }
}
