// Path: crates/settlement/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

//! Off-chain mirror of the jurisdiction contract.
//!
//! The contract itself is external: it is a source of authenticated events
//! and a sink of authorized batches. This crate mirrors its bookkeeping
//! (reserves, per-channel collateral, FIFO debt queues) so the runtime can
//! ingest deposits and batches deterministically and emit the same events
//! the chain would. Cryptographic verification of a batch's hanko happens
//! on-chain; the mirror checks structure and funds.

pub mod debts;
pub mod jurisdiction;

pub use debts::{enforce_debts, DebtQueue};
pub use jurisdiction::Jurisdiction;
