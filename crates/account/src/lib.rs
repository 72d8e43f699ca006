// Path: crates/account/src/lib.rs
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

//! Bilateral (2-of-2) account consensus.
//!
//! Two entities maintain an append-only frame chain over a shared per-token
//! ledger. Frames chain by prior hash; both sides must compute bitwise
//! identical state hashes for the same frame; simultaneous proposals resolve
//! by the canonical left/right tiebreak.
//!
//! Layering inside the crate:
//! - [`delta`]: pure capacity arithmetic over [`xln_types::account::Delta`].
//! - [`apply`]: validate-then-apply transaction processing on scratch state.
//! - [`frame`]: canonical frame construction and hashing (RLP + keccak256).
//! - [`machine`]: the propose/receive protocol itself.

pub mod apply;
pub mod delta;
pub mod frame;
pub mod machine;

pub use delta::{derive_capacity, CapacityView};
pub use frame::frame_state_hash;
pub use machine::{propose, receive};
