#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Stock Recipe
//!
//! > **A Recipe for concurrency-safe stock decrements in Rust.**
//!
//! This crate guards a single shared number, the quantity of a stock record, against
//! concurrent decrements. Three interchangeable strategies satisfy the same contract:
//! the quantity never goes negative and no decrement is lost.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### The store is an actor
//! The records live in one [`StoreActor`](framework::StoreActor) task that processes requests
//! sequentially. That alone makes every committed write atomically visible, and it gives
//! the store the primitives a relational database would offer:
//! - **Plain reads** that never block.
//! - **Compare-and-swap** guarded by a per-record version.
//! - **Scoped transactions** with exclusive, FIFO row locks (`SELECT ... FOR UPDATE`).
//!
//! ### The strategies are clients
//! Each strategy is a thin [`Decrementer`](decrement::Decrementer) over a
//! [`StoreClient`](framework::StoreClient). Because a decrement is a read followed by a write,
//! two callers can interleave between those steps; the strategies differ only in how they
//! prevent that interleaving from losing an update.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Store ([`framework`])
//! - **Role**: Owns the records, the lock table and open transactions.
//! - **Key items**: [`StoreActor`](framework::StoreActor), [`StoreClient`](framework::StoreClient),
//!   [`Transaction`](framework::Transaction), [`MockStore`](framework::mock::MockStore).
//!
//! ### 2. The Strategies ([`decrement`])
//! - **Role**: Read-check-write under mutual exclusion, row locks, or optimistic versioning.
//! - **Key items**: [`MutexDecrementer`](decrement::MutexDecrementer),
//!   [`PessimisticDecrementer`](decrement::PessimisticDecrementer),
//!   [`OptimisticDecrementer`](decrement::OptimisticDecrementer),
//!   [`RetryCoordinator`](decrement::RetryCoordinator).
//!
//! ### 3. The Orchestrator ([`lifecycle`])
//! - **Role**: Spawns the store, applies [`StockConfig`](lifecycle::StockConfig), shuts down.
//! - **Key items**: [`StockSystem`](lifecycle::StockSystem), [`setup_tracing`](lifecycle::setup_tracing).
//!
//! ### 4. The Data ([`model`])
//! - **Role**: [`Stock`](model::Stock) and its typed ids, [`Version`](model::Version), [`StockLevel`](model::StockLevel).
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use stock_recipe::decrement::{Decrementer, Strategy};
//! use stock_recipe::lifecycle::{StockConfig, StockSystem};
//! use stock_recipe::model::ProductId;
//!
//! #[tokio::main]
//! async fn main() {
//!     let system = StockSystem::new(StockConfig::default());
//!     let id = system.create_stock(ProductId(1), 100).await.unwrap();
//!
//!     let level = system
//!         .decrementer(Strategy::Optimistic)
//!         .decrement(id, 1)
//!         .await
//!         .unwrap();
//!     assert_eq!(level.quantity, 99);
//!
//!     system.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## 🧪 Testing
//!
//! See [`framework::mock`] for a scripted store that drives exact interleavings without
//! spawning the actor.

pub mod decrement;
pub mod framework;
pub mod lifecycle;
pub mod model;
