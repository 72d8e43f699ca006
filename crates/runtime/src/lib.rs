// Path: crates/runtime/src/lib.rs
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

//! The server tier: a single-threaded tick reducer over the replica map.
//!
//! A tick consumes a batch of inputs in order, dispatches each to its
//! `(signer, entity)` replica, and emits exactly one authenticated
//! [`xln_types::server::ServerFrame`]. All I/O is modeled as values:
//! outbound consensus and bilateral messages produced by a tick are queued
//! and re-enter as inputs of a later tick; settlement submissions are
//! drained by the host. Nothing inside the reducer suspends or blocks.

pub mod config;
pub mod persist;
pub mod reducer;
pub mod runtime;
pub mod watcher;

pub use config::{validate_quorum, RuntimeConfig};
pub use persist::{FrameLog, MemFrameLog};
pub use reducer::{apply_server_frame, verify_server_frame};
pub use runtime::Runtime;
pub use watcher::ingest_events;
