//! Concurrency-controlled stock decrements.
//!
//! Every strategy implements [`Decrementer`] and satisfies the same contract: a
//! successful decrement returns the post-decrement [`StockLevel`], a failed one leaves
//! the stored quantity untouched, and the quantity never goes below zero.
//!
//! | Strategy | Serializes through | Blocks | Fails with |
//! |----------|--------------------|--------|------------|
//! | [`MutexDecrementer`] | in-process mutex per stock id | on the mutex | `InsufficientStock` |
//! | [`PessimisticDecrementer`] | store row lock inside a transaction | on the row lock | `InsufficientStock`, `LockTimeout` |
//! | [`OptimisticDecrementer`] | version compare-and-swap | never | `InsufficientStock`, `VersionConflict` |
//!
//! [`RetryCoordinator`] wraps any of them and retries version conflicts under a
//! bounded [`RetryPolicy`].

pub mod error;
pub mod mutex;
pub mod optimistic;
pub mod pessimistic;
pub mod retry;

pub use error::StockError;
pub use mutex::MutexDecrementer;
pub use optimistic::OptimisticDecrementer;
pub use pessimistic::PessimisticDecrementer;
pub use retry::{decrement_with_retry, Backoff, RetryCoordinator, RetryPolicy};

use crate::model::{Stock, StockId, StockLevel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;

/// The three concurrency-control strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Mutex,
    Pessimistic,
    Optimistic,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Mutex, Strategy::Pessimistic, Strategy::Optimistic];
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::Mutex => "mutex",
            Strategy::Pessimistic => "pessimistic",
            Strategy::Optimistic => "optimistic",
        };
        f.write_str(name)
    }
}

/// Decrements the quantity of a stock record.
#[async_trait]
pub trait Decrementer: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Removes `amount` units from `id`, returning the state after the write.
    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError>;
}

#[async_trait]
impl<D: Decrementer + ?Sized> Decrementer for Arc<D> {
    fn strategy(&self) -> Strategy {
        (**self).strategy()
    }

    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        (**self).decrement(id, amount).await
    }
}

pub(crate) fn ensure_amount(amount: u64) -> Result<(), StockError> {
    if amount == 0 {
        return Err(StockError::InvalidAmount(amount));
    }
    Ok(())
}

/// The quantity left after taking `amount` from `stock`.
pub(crate) fn remaining(stock: &Stock, amount: u64) -> Result<u64, StockError> {
    stock
        .quantity
        .checked_sub(amount)
        .ok_or(StockError::InsufficientStock {
            id: stock.id,
            requested: amount,
            available: stock.quantity,
        })
}
