// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # XLN Core Types
//!
//! This crate is the foundational library for the XLN state machine, containing
//! all core data structures, error types, and well-known constants.
//!
//! ## Architectural Role
//!
//! As the base crate, `xln-types` has minimal dependencies and is itself a
//! dependency for every other crate in the workspace. This structure prevents
//! circular dependencies and provides a stable, canonical definition for shared
//! types like `EntityId`, `Delta`, `AccountFrame`, and the error enums.
//!
//! The three consensus tiers share one rule for canonical bytes: transport and
//! persistence use the SCALE wrappers in [`codec`], while hash preimages that
//! must match the jurisdiction contract use RLP + keccak256 (implemented in
//! `xln-crypto`, preimage layouts documented on the frame types here).

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// Per-token bilateral account ledgers: deltas, frames, transactions, wire messages.
pub mod account;
/// The canonical, deterministic binary codec for consensus-critical state.
pub mod codec;
/// Entity-tier structures: quorum configuration, entity transactions, consensus frames.
pub mod entity;
/// A unified set of all error types used across the workspace.
pub mod error;
/// Core identifiers: entity ids, signer indices, token ids, canonical ordering.
pub mod primitives;
/// Runtime-tier structures: inputs, commands, server frames.
pub mod server;
/// Jurisdiction-facing structures: settlement events, batches, debts.
pub mod settlement;
