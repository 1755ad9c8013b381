//! Pessimistic locking at the storage layer.
//!
//! The decrement runs inside a store [`Transaction`]: `get_for_update` takes the row
//! lock, the new quantity is staged, and commit publishes it and releases the lock.
//! Any failure rolls the transaction back, so the lock never outlives the call.

use crate::decrement::{ensure_amount, remaining, Decrementer, StockError, Strategy};
use crate::framework::{StoreClient, Transaction};
use crate::model::{StockId, StockLevel};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct PessimisticDecrementer {
    store: StoreClient,
    lock_timeout: Option<Duration>,
}

impl PessimisticDecrementer {
    /// Waits for the row lock as long as it takes.
    pub fn new(store: StoreClient) -> Self {
        Self {
            store,
            lock_timeout: None,
        }
    }

    /// Gives up with [`StockError::LockTimeout`] after `timeout` waiting for the row lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    async fn apply(
        &self,
        txn: &Transaction,
        id: StockId,
        amount: u64,
    ) -> Result<StockLevel, StockError> {
        let stock = txn.get_for_update(id, self.lock_timeout).await?;
        let quantity = remaining(&stock, amount)?;
        txn.save(id, quantity).await?;
        Ok(StockLevel {
            quantity,
            version: stock.version.next(),
        })
    }
}

#[async_trait]
impl Decrementer for PessimisticDecrementer {
    fn strategy(&self) -> Strategy {
        Strategy::Pessimistic
    }

    #[instrument(skip(self), fields(strategy = "pessimistic"))]
    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        ensure_amount(amount)?;

        let txn = self.store.begin().await?;
        let txn_id = txn.id();

        match self.apply(&txn, id, amount).await {
            Ok(level) => {
                txn.commit().await?;
                debug!(%txn_id, quantity = level.quantity, version = %level.version, "Decremented");
                Ok(level)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(%txn_id, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
