// Path: crates/runtime/src/watcher.rs

//! Settlement ingestion: turns jurisdiction events into runtime inputs.
//!
//! An external watcher tails the chain and hands batches of events here.
//! Each event becomes an `ImportJEvent` command addressed to the local
//! replicas of the entities it involves (one copy per entity, preferring
//! the proposer replica). Events whose absolute values already match the
//! replica's state are skipped idempotently.

use crate::reducer::ReplicaMap;
use tracing::debug;
use xln_types::entity::Replica;
use xln_types::primitives::EntityId;
use xln_types::server::{Command, Input};
use xln_types::settlement::JEvent;

fn involved_entities(event: &JEvent) -> Vec<EntityId> {
    match event {
        JEvent::EntityRegistered { entity, .. } | JEvent::ReserveUpdated { entity, .. } => {
            vec![*entity]
        }
        JEvent::ReserveToCollateral { left, right, .. }
        | JEvent::SettlementProcessed { left, right, .. }
        | JEvent::DisputeStarted { left, right, .. }
        | JEvent::DisputeFinalized { left, right, .. } => vec![*left, *right],
    }
}

fn local_target<'a>(replicas: &'a ReplicaMap, entity: &EntityId) -> Option<&'a Replica> {
    replicas
        .values()
        .filter(|r| r.entity == *entity)
        .find(|r| r.is_proposer())
        .or_else(|| replicas.values().find(|r| r.entity == *entity))
}

/// Whether the event's absolute values already match the replica's state.
fn is_stale(replica: &Replica, event: &JEvent) -> bool {
    match event {
        JEvent::ReserveUpdated {
            token_id,
            new_amount,
            ..
        } => {
            replica.state.reserves.get(token_id).copied().unwrap_or(0) == *new_amount
                && replica.state.height > 0
        }
        _ => false,
    }
}

/// Converts a batch of chain events into inputs for the local replicas.
pub fn ingest_events(events: &[JEvent], replicas: &ReplicaMap) -> Vec<Input> {
    let mut inputs = Vec::new();
    for event in events {
        for entity in involved_entities(event) {
            let Some(replica) = local_target(replicas, &entity) else {
                continue;
            };
            if is_stale(replica, event) {
                debug!(target: "jwatcher", "skipping stale event for {}", entity);
                continue;
            }
            inputs.push(Input {
                signer_idx: replica.signer,
                entity_id: entity,
                command: Command::ImportJEvent {
                    event: event.clone(),
                },
            });
        }
    }
    inputs
}
