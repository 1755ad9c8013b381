use crate::decrement::{
    Decrementer, MutexDecrementer, OptimisticDecrementer, PessimisticDecrementer,
    RetryCoordinator, StockError, Strategy,
};
use crate::framework::{StoreActor, StoreClient};
use crate::lifecycle::StockConfig;
use crate::model::{ProductId, Stock, StockCreate, StockId};
use std::sync::Arc;
use tracing::{error, info};

/// The runtime orchestrator for the stock store and its decrement strategies.
///
/// `StockSystem` is responsible for:
/// - **Lifecycle Management**: Starting and stopping the store actor
/// - **Dependency Wiring**: Handing the store client to each strategy
/// - **Configuration**: Applying lock timeout and retry policy from [`StockConfig`]
///
/// # Example
///
/// ```ignore
/// let system = StockSystem::new(StockConfig::default());
///
/// let id = system.create_stock(ProductId(1), 100).await?;
/// let level = system.decrementer(Strategy::Optimistic).decrement(id, 1).await?;
///
/// // Gracefully shut down when done
/// system.shutdown().await?;
/// ```
pub struct StockSystem {
    config: StockConfig,
    store: StoreClient,
    /// Shared so that every caller of `decrementer(Strategy::Mutex)` serializes on the same registry
    mutex: MutexDecrementer,
    handle: tokio::task::JoinHandle<()>,
}

impl StockSystem {
    /// Spawns the store actor. Must be called inside a Tokio runtime.
    pub fn new(config: StockConfig) -> Self {
        let (actor, store) = StoreActor::new(config.buffer_size);
        let handle = tokio::spawn(actor.run());
        info!(strategy = %config.strategy, buffer_size = config.buffer_size, "Stock system started");

        Self {
            mutex: MutexDecrementer::new(store.clone()),
            config,
            store,
            handle,
        }
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    pub fn store(&self) -> StoreClient {
        self.store.clone()
    }

    pub async fn create_stock(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockId, StockError> {
        Ok(self
            .store
            .create(StockCreate {
                product_id,
                quantity,
            })
            .await?)
    }

    pub async fn stock(&self, id: StockId) -> Result<Stock, StockError> {
        Ok(self.store.get(id).await?)
    }

    /// The configured decrementer for `strategy`. The optimistic one retries conflicts.
    pub fn decrementer(&self, strategy: Strategy) -> Arc<dyn Decrementer> {
        match strategy {
            Strategy::Optimistic => Arc::new(RetryCoordinator::new(
                OptimisticDecrementer::new(self.store()),
                self.config.retry.policy(),
            )),
            other => self.raw_decrementer(other),
        }
    }

    /// The decrementer for `strategy` without any retry wrapping.
    pub fn raw_decrementer(&self, strategy: Strategy) -> Arc<dyn Decrementer> {
        match strategy {
            Strategy::Mutex => Arc::new(self.mutex.clone()),
            Strategy::Pessimistic => {
                let pessimistic = PessimisticDecrementer::new(self.store());
                match self.config.lock_timeout() {
                    Some(timeout) => Arc::new(pessimistic.with_lock_timeout(timeout)),
                    None => Arc::new(pessimistic),
                }
            }
            Strategy::Optimistic => Arc::new(OptimisticDecrementer::new(self.store())),
        }
    }

    /// The decrementer for the strategy named in the configuration.
    pub fn default_decrementer(&self) -> Arc<dyn Decrementer> {
        self.decrementer(self.config.strategy)
    }

    /// Stops the store actor and waits for it to finish.
    ///
    /// Decrementers still held elsewhere fail with `StorageFailure` afterwards.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down stock system...");

        if let Err(e) = self.store.shutdown().await {
            // Actor already gone; the join below reports why
            error!(error = %e, "Shutdown request not delivered");
        }

        if let Err(e) = self.handle.await {
            error!("Store task failed: {:?}", e);
            return Err(format!("Store task failed: {:?}", e));
        }

        info!("Stock system shutdown complete.");
        Ok(())
    }
}
