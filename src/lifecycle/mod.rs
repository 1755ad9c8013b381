//! # System Lifecycle & Orchestration
//!
//! This module starts the store actor, hands its client to the decrement strategies,
//! and shuts everything down again.
//!
//! **Key Responsibilities:**
//! 1. **Actor Creation** - Spawn the [`StoreActor`](crate::framework::StoreActor)
//! 2. **Dependency Injection** - Build each strategy around the shared store client
//! 3. **Configuration** - Load [`StockConfig`] and turn it into lock timeouts and retry policy
//! 4. **Graceful Shutdown** - Send the explicit stop and await the actor task
//! 5. **Observability Setup** - Initialize tracing and logging infrastructure
//!
//! ## Shutdown
//!
//! Dropping the system's own client is not enough to stop the actor, since decrementers
//! keep store clients alive in other tasks. [`StockSystem::shutdown`] therefore sends an
//! explicit `Shutdown` request, and late callers observe `StorageFailure`.

pub mod config;
pub mod stock_system;
pub mod tracing;

pub use config::{ConfigError, RetrySettings, StockConfig};
pub use stock_system::StockSystem;
pub use self::tracing::setup_tracing;
