//! Actor-backed stock store.
//!
//! This module provides the storage primitives the decrement strategies are built from:
//! plain reads, version-guarded compare-and-swap, unconditional writes, and scoped
//! transactions with exclusive row locks.
//!
//! # Main Components
//!
//! - [`StoreActor`] - Owns every record and serializes access to it
//! - [`StoreClient`] - Cloneable async handle to the actor
//! - [`Transaction`] - Scope guard for row-locked read-modify-write
//! - [`StoreError`] - Failures of the store itself
//!
//! # Testing
//!
//! See [`mock`] module for a scripted store that needs no running actor.

pub mod actor;
pub mod client;
pub mod error;
pub(crate) mod lock_table;
pub mod message;
pub mod mock;
pub mod transaction;

// Re-export core types for convenience
pub use actor::StoreActor;
pub use client::StoreClient;
pub use error::StoreError;
pub use message::{Response, StoreRequest};
pub use transaction::{Transaction, TxnId};
