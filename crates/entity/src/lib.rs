// Path: crates/entity/src/lib.rs
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

//! Weighted BFT consensus over entity state.
//!
//! An entity is governed by a validator set with weighted shares. Each
//! validator holds a [`xln_types::entity::Replica`]; the first validator is
//! the proposer. The flow is gather → propose → precommit (with a
//! CometBFT-style lock) → commit once accumulated shares reach the
//! configured absolute threshold. Committed frames carry the signature set
//! and an aggregate signature so followers can verify the quorum before
//! adopting the new state.
//!
//! All functions here are synchronous and deterministic; outbound messages
//! are returned as [`EntityOutput`] values, never sent from inside.

pub mod consensus;
pub mod frame;
pub mod keyring;
pub mod reducer;

pub use consensus::{add_tx, commit_frame, propose, receive_proposal, sign_frame};
pub use keyring::EntityKeyring;
pub use reducer::EntityOutput;
