// Path: crates/runtime/src/runtime.rs

//! The process-wide runtime value.
//!
//! Owns the replica map, the server height, the outbound queue and the
//! installed keyrings, with explicit construction and teardown; entry points
//! thread `&mut Runtime` instead of touching globals. One call to
//! [`Runtime::tick`] is one server frame.

use crate::config::RuntimeConfig;
use crate::persist::FrameLog;
use crate::reducer::{apply_server_frame, ReplicaMap, TickEffects};
use std::collections::{BTreeMap, VecDeque};
use tracing::{info, warn};
use xln_entity::EntityKeyring;
use xln_types::error::RuntimeError;
use xln_types::primitives::{EntityId, SignerIdx};
use xln_types::server::{Input, ServerFrame};
use xln_types::settlement::BatchSubmission;

/// The server runtime: replica map, height, queues and keys.
pub struct Runtime {
    config: RuntimeConfig,
    replicas: ReplicaMap,
    height: u64,
    keyrings: BTreeMap<(SignerIdx, EntityId), EntityKeyring>,
    /// Messages produced by earlier ticks, consumed by the next one.
    outbox: VecDeque<Input>,
    /// Settlement submissions awaiting the host's chain client.
    submissions: Vec<BatchSubmission>,
    frame_log: Option<Box<dyn FrameLog>>,
}

impl Runtime {
    /// Builds a runtime from a validated configuration.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self {
            config,
            replicas: ReplicaMap::new(),
            height: 0,
            keyrings: BTreeMap::new(),
            outbox: VecDeque::new(),
            submissions: Vec::new(),
            frame_log: None,
        })
    }

    /// Installs the append-only frame log.
    pub fn with_frame_log(mut self, log: Box<dyn FrameLog>) -> Self {
        self.frame_log = Some(log);
        self
    }

    /// Installs the keyring for a `(signer, entity)` slot.
    pub fn install_keyring(&mut self, signer: SignerIdx, entity: EntityId, keyring: EntityKeyring) {
        self.keyrings.insert((signer, entity), keyring);
    }

    /// Current server height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Read-only view of the replica map, for snapshot observers between
    /// ticks.
    pub fn replicas(&self) -> &ReplicaMap {
        &self.replicas
    }

    /// Queues an input for the next tick.
    pub fn enqueue(&mut self, input: Input) {
        self.outbox.push_back(input);
    }

    /// Pending queue length (internal messages awaiting the next tick).
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Drains settlement submissions for the host's chain client.
    pub fn take_submissions(&mut self) -> Vec<BatchSubmission> {
        std::mem::take(&mut self.submissions)
    }

    /// Runs one tick: consumes queued messages plus `external` inputs, in
    /// that order, and emits the tick's frame.
    pub fn tick(&mut self, external: Vec<Input>, now: u64) -> Result<ServerFrame, RuntimeError> {
        let mut batch: Vec<Input> = self.outbox.drain(..).collect();
        batch.extend(external);
        if self.config.max_batch > 0 && batch.len() > self.config.max_batch as usize {
            // Overflow carries into the next tick, oldest first.
            let overflow = batch.split_off(self.config.max_batch as usize);
            for input in overflow.into_iter().rev() {
                self.outbox.push_front(input);
            }
        }

        self.height += 1;
        let (frame, effects) = apply_server_frame(
            &mut self.replicas,
            batch,
            now,
            self.height,
            &self.keyrings,
        );
        self.absorb(effects);

        if let Some(log) = &mut self.frame_log {
            log.append(&frame)?;
        }
        info!(
            target: "server",
            "tick h={} inputs={} queued={}",
            frame.height,
            frame.batch.len(),
            self.outbox.len()
        );
        Ok(frame)
    }

    /// Runs ticks until the internal queue drains or `max_ticks` is hit.
    ///
    /// Convenience for hosts and tests; each round is a full frame. The tick
    /// timestamp is advanced by one per round so frame times stay monotonic.
    pub fn run_until_idle(
        &mut self,
        start: u64,
        max_ticks: u32,
    ) -> Result<Vec<ServerFrame>, RuntimeError> {
        let mut frames = Vec::new();
        let mut now = start;
        let mut rounds = 0;
        while !self.outbox.is_empty() {
            if rounds >= max_ticks {
                warn!(target: "server", "queue not drained after {} ticks", max_ticks);
                break;
            }
            frames.push(self.tick(Vec::new(), now)?);
            now += 1;
            rounds += 1;
        }
        Ok(frames)
    }

    fn absorb(&mut self, effects: TickEffects) {
        for input in effects.requeued {
            self.outbox.push_back(input);
        }
        self.submissions.extend(effects.submissions);
        for (input, err) in &effects.rejected {
            warn!(
                target: "server",
                "rejected input cmd={} err={}",
                input.command.label(),
                err
            );
        }
    }

    /// Tears the runtime down, returning the final replica map for the
    /// host's snapshot store.
    pub fn shutdown(self) -> ReplicaMap {
        info!(target: "server", "shutdown at h={}", self.height);
        self.replicas
    }
}
