//! Error types for stock decrements.

use crate::framework::StoreError;
use crate::model::{StockId, Version};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while decrementing stock.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StockError {
    /// The requested stock record was not found.
    #[error("Stock not found: {0}")]
    NotFound(StockId),

    /// The requested amount exceeds the available stock.
    #[error("Insufficient stock on {id}: requested {requested}, available {available}")]
    InsufficientStock {
        id: StockId,
        requested: u64,
        available: u64,
    },

    /// Zero is not a decrement.
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    /// An optimistic write lost the race against another writer.
    #[error("Version conflict on {id}: expected {expected}")]
    VersionConflict { id: StockId, expected: Version },

    /// Every retry attempt ended in a version conflict.
    #[error("Retry exhausted on {id} after {attempts} attempts")]
    RetryExhausted { id: StockId, attempts: u32 },

    /// The row lock could not be acquired in time.
    #[error("Timed out after {waited:?} waiting for the lock on {id}")]
    LockTimeout { id: StockId, waited: Duration },

    /// The store is unavailable or rejected the operation.
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl StockError {
    /// Only a lost optimistic race is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::VersionConflict { .. })
    }
}

impl From<StoreError> for StockError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => StockError::NotFound(id),
            StoreError::LockTimeout { id, waited } => StockError::LockTimeout { id, waited },
            other => StockError::StorageFailure(other.to_string()),
        }
    }
}
