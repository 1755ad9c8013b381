//! Optimistic concurrency: read, compute, compare-and-swap on the version.

use crate::decrement::{ensure_amount, remaining, Decrementer, StockError, Strategy};
use crate::framework::StoreClient;
use crate::model::{StockId, StockLevel};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Never blocks. A lost race surfaces as [`StockError::VersionConflict`] and leaves the
/// record as the winner wrote it; wrap in a [`RetryCoordinator`](crate::decrement::RetryCoordinator)
/// to make progress under contention.
#[derive(Clone)]
pub struct OptimisticDecrementer {
    store: StoreClient,
}

impl OptimisticDecrementer {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Decrementer for OptimisticDecrementer {
    fn strategy(&self) -> Strategy {
        Strategy::Optimistic
    }

    #[instrument(skip(self), fields(strategy = "optimistic"))]
    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        ensure_amount(amount)?;

        let stock = self.store.get(id).await?;
        let quantity = remaining(&stock, amount)?;

        if !self
            .store
            .compare_and_swap(id, stock.version, quantity)
            .await?
        {
            debug!(expected = %stock.version, "Lost compare-and-swap");
            return Err(StockError::VersionConflict {
                id,
                expected: stock.version,
            });
        }

        let level = StockLevel {
            quantity,
            version: stock.version.next(),
        };
        debug!(quantity, version = %level.version, "Decremented");
        Ok(level)
    }
}
