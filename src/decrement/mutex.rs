//! In-process mutual exclusion.
//!
//! Serializes decrements per stock id inside one process. Two processes sharing the
//! same store are not serialized against each other by this strategy.

use crate::decrement::{ensure_amount, remaining, Decrementer, StockError, Strategy};
use crate::framework::StoreClient;
use crate::model::{StockId, StockLevel};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

type Registry = Arc<RwLock<HashMap<StockId, Arc<Mutex<()>>>>>;

/// Holds one async mutex per stock id for the read-modify-write span.
///
/// Clones share the registry, so every clone serializes against the others.
#[derive(Clone)]
pub struct MutexDecrementer {
    store: StoreClient,
    locks: Registry,
}

impl MutexDecrementer {
    pub fn new(store: StoreClient) -> Self {
        Self {
            store,
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The mutex guarding `id`, created on first use.
    async fn lock_for(&self, id: StockId) -> Arc<Mutex<()>> {
        {
            let read = self.locks.read().await;
            if let Some(lock) = read.get(&id) {
                return lock.clone();
            }
        }
        let mut write = self.locks.write().await;
        write
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the registry entry for `id` unless another caller still holds or awaits it.
    async fn forget_if_unused(&self, id: StockId, lock: &Arc<Mutex<()>>) {
        let mut write = self.locks.write().await;
        // One reference in the map and one held by the caller
        if Arc::strong_count(lock) == 2 {
            write.remove(&id);
        }
    }

    async fn decrement_locked(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        let stock = self.store.get(id).await?;
        let quantity = remaining(&stock, amount)?;
        let saved = self.store.save(id, quantity).await?;

        debug!(quantity = saved.quantity, version = %saved.version, "Decremented");
        Ok(saved.level())
    }
}

#[async_trait]
impl Decrementer for MutexDecrementer {
    fn strategy(&self) -> Strategy {
        Strategy::Mutex
    }

    #[instrument(skip(self), fields(strategy = "mutex"))]
    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        ensure_amount(amount)?;

        let lock = self.lock_for(id).await;
        let result = {
            // Released on every exit path when the guard goes out of scope
            let _guard = lock.lock().await;
            self.decrement_locked(id, amount).await
        };

        if let Err(StockError::NotFound(_)) = result {
            self.forget_if_unused(id, &lock).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockStore;
    use crate::framework::StoreError;
    use crate::model::{ProductId, Stock, Version};

    fn stock(quantity: u64, version: u64) -> Stock {
        Stock {
            id: StockId(1),
            product_id: ProductId(1),
            quantity,
            version: Version(version),
        }
    }

    #[tokio::test]
    async fn test_decrement_reads_then_saves() {
        let mut mock = MockStore::new();
        mock.expect_get(StockId(1)).return_ok(stock(10, 0));
        mock.expect_save(StockId(1)).return_ok(stock(7, 1));

        let decrementer = MutexDecrementer::new(mock.client());
        let level = decrementer.decrement(StockId(1), 3).await.unwrap();

        assert_eq!(level.quantity, 7);
        assert_eq!(level.version, Version(1));
        mock.verify();
    }

    #[tokio::test]
    async fn test_insufficient_stock_skips_save() {
        let mut mock = MockStore::new();
        mock.expect_get(StockId(1)).return_ok(stock(2, 5));

        let decrementer = MutexDecrementer::new(mock.client());
        let result = decrementer.decrement(StockId(1), 3).await;

        assert_eq!(
            result,
            Err(StockError::InsufficientStock {
                id: StockId(1),
                requested: 3,
                available: 2
            })
        );
        mock.verify();
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let mut mock = MockStore::new();
        mock.expect_get(StockId(1))
            .return_err(StoreError::NotFound(StockId(1)));
        mock.expect_get(StockId(1)).return_ok(stock(1, 0));
        mock.expect_save(StockId(1)).return_ok(stock(0, 1));

        let decrementer = MutexDecrementer::new(mock.client());
        assert_eq!(
            decrementer.decrement(StockId(1), 1).await,
            Err(StockError::NotFound(StockId(1)))
        );
        // A leaked guard would deadlock here
        let level = decrementer.decrement(StockId(1), 1).await.unwrap();
        assert_eq!(level.quantity, 0);
        mock.verify();
    }

    #[tokio::test]
    async fn test_unknown_ids_do_not_grow_registry() {
        let mut mock = MockStore::new();
        for n in 100..110 {
            mock.expect_get(StockId(n))
                .return_err(StoreError::NotFound(StockId(n)));
        }

        let decrementer = MutexDecrementer::new(mock.client());
        for n in 100..110 {
            assert_eq!(
                decrementer.decrement(StockId(n), 1).await,
                Err(StockError::NotFound(StockId(n)))
            );
        }

        assert!(decrementer.locks.read().await.is_empty());
        mock.verify();
    }

    #[tokio::test]
    async fn test_known_ids_keep_their_mutex() {
        let mut mock = MockStore::new();
        mock.expect_get(StockId(1)).return_ok(stock(3, 0));
        mock.expect_save(StockId(1)).return_ok(stock(2, 1));

        let decrementer = MutexDecrementer::new(mock.client());
        decrementer.decrement(StockId(1), 1).await.unwrap();

        assert!(decrementer.locks.read().await.contains_key(&StockId(1)));
        mock.verify();
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let mock = MockStore::new();
        let decrementer = MutexDecrementer::new(mock.client());
        let clone = decrementer.clone();

        let a = decrementer.lock_for(StockId(1)).await;
        let b = clone.lock_for(StockId(1)).await;
        let c = clone.lock_for(StockId(2)).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let mock = MockStore::new();
        let decrementer = MutexDecrementer::new(mock.client());
        assert_eq!(
            decrementer.decrement(StockId(1), 0).await,
            Err(StockError::InvalidAmount(0))
        );
        mock.verify();
    }
}
