//! # Store Messages
//!
//! This module defines the message types exchanged between the [`StoreClient`](crate::framework::StoreClient)
//! and the [`StoreActor`](crate::framework::StoreActor).

use crate::framework::{StoreError, TxnId};
use crate::model::{Stock, StockCreate, StockId, Version};
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Request sent to the store actor.
///
/// # Primitives
/// The variants map one-to-one onto the storage primitives the decrement strategies
/// are built from:
///
/// - **Create**: Lifecycle start. A new record at version 0.
/// - **Get**: Plain committed read. Never waits on row locks.
/// - **CompareAndSwap**: Conditional write guarded by the record version.
/// - **Save**: Unconditional write outside any transaction.
/// - **Begin / GetForUpdate / Stage / Commit / Rollback**: The scoped transaction.
///   `GetForUpdate` takes the row lock, `Stage` buffers a write under it, and
///   `Commit`/`Rollback` end the transaction and release every lock it holds.
/// - **Shutdown**: Stops the actor even while clients are still alive.
#[derive(Debug)]
pub enum StoreRequest {
    Create {
        params: StockCreate,
        respond_to: Response<StockId>,
    },
    Get {
        id: StockId,
        respond_to: Response<Stock>,
    },
    CompareAndSwap {
        id: StockId,
        expected: Version,
        quantity: u64,
        respond_to: Response<bool>,
    },
    Save {
        id: StockId,
        quantity: u64,
        respond_to: Response<Stock>,
    },
    Begin {
        respond_to: Response<TxnId>,
    },
    GetForUpdate {
        txn: TxnId,
        id: StockId,
        respond_to: Response<Stock>,
    },
    Stage {
        txn: TxnId,
        id: StockId,
        quantity: u64,
        respond_to: Response<()>,
    },
    Commit {
        txn: TxnId,
        respond_to: Response<()>,
    },
    /// `respond_to` is `None` when the rollback comes from a dropped transaction guard.
    Rollback {
        txn: TxnId,
        respond_to: Option<Response<()>>,
    },
    Shutdown,
}
