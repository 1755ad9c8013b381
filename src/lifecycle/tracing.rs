//! # Observability & Tracing
//!
//! The [`setup_tracing`] function initializes structured logging with the `tracing` crate.
//!
//! ## Configuration
//!
//! The compact format hides the crate/module prefix (`with_target(false)`); the strategy
//! and record are identified by span names and the `stock_id` / `txn` fields instead.
//!
//! ```bash
//! # Outcomes per strategy, commits and rollbacks
//! RUST_LOG=info cargo run
//!
//! # Lock waits, grants, lost compare-and-swaps and retry backoff
//! RUST_LOG=debug cargo run
//!
//! # Only the store actor
//! RUST_LOG=stock_recipe::framework=debug cargo run
//! ```
//!
//! ## What Gets Traced
//!
//! **With `RUST_LOG=debug`**, a pessimistic decrement that had to queue:
//!
//! ```text
//! DEBUG decrement{strategy="pessimistic" id=StockId(1) amount=1}: Begin txn=txn_7 open=3
//! DEBUG Waiting for row lock stock_id=stock_1 txn=txn_7 holder=Some(TxnId(6))
//! INFO  Committed stock_id=stock_1 txn=txn_6 quantity=94 version=v6
//! DEBUG Lock granted stock_id=stock_1 txn=txn_7
//! ```
//!
//! and an optimistic decrement that lost a race once:
//!
//! ```text
//! DEBUG retry{id=StockId(1) amount=1}:decrement{strategy="optimistic" ...}: Lost compare-and-swap expected=v3
//! DEBUG retry{id=StockId(1) amount=1}: Conflict, backing off attempt=1 delay=31ms
//! ```

/// Installs the global subscriber. Call once, at process start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
