// Path: crates/settlement/src/debts.rs

//! FIFO debt enforcement.
//!
//! Debts per `(entity, token)` are paid strictly in insertion order from
//! incoming reserves. A partial payment mutates only the head entry;
//! `debt_index` advances only when a head is fully paid, so it counts debts
//! retired since the queue was created.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use xln_types::primitives::EntityId;
use xln_types::settlement::Debt;

/// The FIFO debt queue of one `(entity, token)` pair.
#[derive(Encode, Decode, Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct DebtQueue {
    /// Outstanding debts, oldest first.
    pub debts: VecDeque<Debt>,
    /// Count of fully repaid debts since the queue was created.
    pub debt_index: u64,
}

impl DebtQueue {
    /// Sum of the outstanding amounts.
    pub fn outstanding(&self) -> u128 {
        self.debts.iter().map(|d| d.amount).sum()
    }
}

/// Pays the queue from `incoming` reserve.
///
/// Returns the payments made (creditor, amount) in order, and the reserve
/// remaining after enforcement.
pub fn enforce_debts(queue: &mut DebtQueue, incoming: u128) -> (Vec<(EntityId, u128)>, u128) {
    let mut remaining = incoming;
    let mut payments = Vec::new();
    while remaining > 0 {
        let Some(head) = queue.debts.front_mut() else {
            break;
        };
        if remaining >= head.amount {
            payments.push((head.creditor, head.amount));
            remaining -= head.amount;
            queue.debts.pop_front();
            queue.debt_index += 1;
        } else {
            payments.push((head.creditor, remaining));
            head.amount -= remaining;
            remaining = 0;
        }
    }
    (payments, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debt(amount: u128, creditor: u64) -> Debt {
        Debt {
            amount,
            creditor: EntityId::from_index(creditor),
        }
    }

    #[test]
    fn partial_payment_mutates_only_the_head() {
        let mut queue = DebtQueue {
            debts: VecDeque::from([debt(120, 1), debt(80, 2)]),
            debt_index: 0,
        };
        let (payments, remaining) = enforce_debts(&mut queue, 150);

        assert_eq!(
            payments,
            vec![
                (EntityId::from_index(1), 120),
                (EntityId::from_index(2), 30),
            ]
        );
        assert_eq!(remaining, 0);
        assert_eq!(queue.debts, VecDeque::from([debt(50, 2)]));
        assert_eq!(queue.debt_index, 1);
    }

    #[test]
    fn full_payment_clears_the_queue() {
        let mut queue = DebtQueue {
            debts: VecDeque::from([debt(10, 1), debt(20, 2)]),
            debt_index: 5,
        };
        let (payments, remaining) = enforce_debts(&mut queue, 100);
        assert_eq!(payments.len(), 2);
        assert_eq!(remaining, 70);
        assert!(queue.debts.is_empty());
        assert_eq!(queue.debt_index, 7);
    }

    #[test]
    fn zero_incoming_changes_nothing() {
        let mut queue = DebtQueue {
            debts: VecDeque::from([debt(10, 1)]),
            debt_index: 0,
        };
        let (payments, remaining) = enforce_debts(&mut queue, 0);
        assert!(payments.is_empty());
        assert_eq!(remaining, 0);
        assert_eq!(queue.outstanding(), 10);
    }

    #[test]
    fn insertion_order_is_respected_across_calls() {
        let mut queue = DebtQueue {
            debts: VecDeque::from([debt(50, 1), debt(50, 2), debt(50, 3)]),
            debt_index: 0,
        };
        let original: u128 = queue.outstanding();
        let (first, _) = enforce_debts(&mut queue, 60);
        assert_eq!(first[0].0, EntityId::from_index(1));
        assert_eq!(first[1].0, EntityId::from_index(2));
        let paid: u128 = first.iter().map(|(_, a)| a).sum();
        assert_eq!(queue.outstanding(), original - paid);

        let (second, _) = enforce_debts(&mut queue, 200);
        assert_eq!(second[0].0, EntityId::from_index(2));
        assert_eq!(second[1].0, EntityId::from_index(3));
        assert_eq!(queue.debt_index, 3);
    }
}
