//! # Store Errors
//!
//! This module defines the errors produced by the store actor and its client.
//! Business-rule failures (insufficient stock, version conflicts) are not store
//! errors; they live in [`StockError`](crate::decrement::StockError).

use crate::framework::TxnId;
use crate::model::StockId;
use std::time::Duration;

/// Errors that can occur within the store itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store actor closed")]
    ActorClosed,
    #[error("Store actor dropped response channel")]
    ActorDropped,
    #[error("Stock not found: {0}")]
    NotFound(StockId),
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TxnId),
    #[error("{id} is not locked by {txn}")]
    NotLocked { id: StockId, txn: TxnId },
    #[error("Timed out after {waited:?} waiting for the lock on {id}")]
    LockTimeout { id: StockId, waited: Duration },
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}
