use std::sync::Arc;

use stock_recipe::decrement::{Decrementer, StockError, Strategy};
use stock_recipe::lifecycle::{setup_tracing, StockConfig, StockSystem};
use stock_recipe::model::{ProductId, StockId};
use tracing::{error, info, Instrument};

const INITIAL_QUANTITY: u64 = 100;
const CALLERS: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    // Optional path to a TOML config as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => StockConfig::load(&path).map_err(|e| e.to_string())?,
        None => StockConfig::default(),
    };

    info!(?config, "Starting stock system");
    let system = StockSystem::new(config);

    for strategy in Strategy::ALL {
        let span = tracing::info_span!("contention", %strategy);
        async {
            let id = system
                .create_stock(ProductId(1), INITIAL_QUANTITY)
                .await
                .map_err(|e| e.to_string())?;
            let decrementer = system.decrementer(strategy);

            let failures = run_callers(decrementer, id).await;
            let stock = system.stock(id).await.map_err(|e| e.to_string())?;

            if failures.is_empty() && stock.quantity == INITIAL_QUANTITY - CALLERS {
                info!(quantity = stock.quantity, version = %stock.version, "All decrements applied");
            } else {
                error!(quantity = stock.quantity, failed = failures.len(), first = ?failures.first(), "Decrements lost or failed");
            }
            Ok::<_, String>(())
        }
        .instrument(span)
        .await?;
    }

    // Shutdown system gracefully
    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}

/// One task per caller, each taking a single unit.
async fn run_callers(decrementer: Arc<dyn Decrementer>, id: StockId) -> Vec<StockError> {
    let tasks: Vec<_> = (0..CALLERS)
        .map(|_| {
            let decrementer = decrementer.clone();
            tokio::spawn(async move { decrementer.decrement(id, 1).await })
        })
        .collect();

    let mut failures = Vec::new();
    for task in tasks {
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => failures.push(e),
            Err(e) => failures.push(StockError::StorageFailure(e.to_string())),
        }
    }
    failures
}
