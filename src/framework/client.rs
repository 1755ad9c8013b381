//! # Store Client
//!
//! This module defines the client for communicating with the [`StoreActor`](crate::framework::StoreActor).

use crate::framework::message::StoreRequest;
use crate::framework::transaction::Transaction;
use crate::framework::{StoreError, TxnId};
use crate::model::{Stock, StockCreate, StockId, Version};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// A client for interacting with the `StoreActor`.
#[derive(Clone, Debug)]
/// ## StoreClient
///
/// The `StoreClient` provides an async API over the store's primitives. It forwards
/// requests over a Tokio mpsc channel and returns results via oneshot channels. The
/// client is cheap to clone and can be shared across tasks.
///
/// * **Cloneable** – holds only a sender, so cloning is inexpensive.
/// * **Async API** – all methods resolve to `Result<…, StoreError>`.
pub struct StoreClient {
    sender: mpsc::Sender<StoreRequest>,
}

impl StoreClient {
    pub fn new(sender: mpsc::Sender<StoreRequest>) -> Self {
        Self { sender }
    }

    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let response = self.enqueue(build).await?;
        receive(response).await
    }

    /// Hands the request to the actor without waiting for the answer.
    ///
    /// Once this returns `Ok` the actor will process the request even if the
    /// receiver is dropped.
    pub(crate) async fn enqueue<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> StoreRequest,
    ) -> Result<oneshot::Receiver<Result<T, StoreError>>, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        Ok(response)
    }

    pub async fn create(&self, params: StockCreate) -> Result<StockId, StoreError> {
        self.request(|respond_to| StoreRequest::Create { params, respond_to })
            .await
    }

    /// Reads the committed record. Does not wait for row locks.
    pub async fn get(&self, id: StockId) -> Result<Stock, StoreError> {
        self.request(|respond_to| StoreRequest::Get { id, respond_to })
            .await
    }

    /// Writes `quantity` only if the record still carries `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    pub async fn compare_and_swap(
        &self,
        id: StockId,
        expected: Version,
        quantity: u64,
    ) -> Result<bool, StoreError> {
        self.request(|respond_to| StoreRequest::CompareAndSwap {
            id,
            expected,
            quantity,
            respond_to,
        })
        .await
    }

    /// Unconditional write. Waits behind a row lock held by a transaction.
    pub async fn save(&self, id: StockId, quantity: u64) -> Result<Stock, StoreError> {
        self.request(|respond_to| StoreRequest::Save {
            id,
            quantity,
            respond_to,
        })
        .await
    }

    /// Opens a transaction scope. The returned guard rolls back when dropped uncommitted.
    pub async fn begin(&self) -> Result<Transaction, StoreError> {
        let txn = self
            .request(|respond_to| StoreRequest::Begin { respond_to })
            .await?;
        Ok(Transaction::new(txn, self.clone()))
    }

    /// Asks the actor to stop. Outstanding clones will see `ActorClosed` afterwards.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.sender
            .send(StoreRequest::Shutdown)
            .await
            .map_err(|_| StoreError::ActorClosed)
    }

    /// Fire-and-forget rollback used from `Drop`, where awaiting is not possible.
    pub(crate) fn rollback_detached(&self, txn: TxnId) {
        let request = StoreRequest::Rollback {
            txn,
            respond_to: None,
        };
        match self.sender.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let sender = self.sender.clone();
                        handle.spawn(async move {
                            let _ = sender.send(request).await;
                        });
                    }
                    Err(_) => warn!(%txn, "No runtime to deliver rollback"),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

pub(crate) async fn receive<T>(
    response: oneshot::Receiver<Result<T, StoreError>>,
) -> Result<T, StoreError> {
    response.await.map_err(|_| StoreError::ActorDropped)?
}
