//! # Transactions
//!
//! A [`Transaction`] is the client-side handle of a scope opened with
//! [`StoreClient::begin`](crate::framework::StoreClient::begin). Row locks taken through it
//! are held by the store actor until `commit` or `rollback`; dropping the handle
//! without either rolls back.

use crate::framework::client::{receive, StoreClient};
use crate::framework::message::StoreRequest;
use crate::framework::StoreError;
use crate::model::{Stock, StockId};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Type-safe identifier for an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    client: StoreClient,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, client: StoreClient) -> Self {
        Self {
            id,
            client,
            finished: false,
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Reads `id` and takes its exclusive row lock, waiting up to `timeout` if another
    /// transaction holds it. `None` waits indefinitely.
    pub async fn get_for_update(
        &self,
        id: StockId,
        timeout: Option<Duration>,
    ) -> Result<Stock, StoreError> {
        let txn = self.id;
        let locked = self
            .client
            .request(|respond_to| StoreRequest::GetForUpdate {
                txn,
                id,
                respond_to,
            });
        match timeout {
            None => locked.await,
            Some(waited) => tokio::time::timeout(waited, locked)
                .await
                .map_err(|_| StoreError::LockTimeout { id, waited })?,
        }
    }

    /// Stages a new quantity for a row this transaction has locked.
    ///
    /// The write becomes visible to other readers only on commit.
    pub async fn save(&self, id: StockId, quantity: u64) -> Result<(), StoreError> {
        let txn = self.id;
        self.client
            .request(|respond_to| StoreRequest::Stage {
                txn,
                id,
                quantity,
                respond_to,
            })
            .await
    }

    /// Applies every staged write and releases the locks.
    ///
    /// If the commit itself fails the transaction is rolled back before the error is returned.
    /// Cancelled before the request is queued, the guard still rolls back on drop.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        let txn = self.id;
        let queued = self
            .client
            .enqueue(|respond_to| StoreRequest::Commit { txn, respond_to })
            .await;
        self.finished = true;

        let result = match queued {
            Ok(response) => receive(response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            debug!(%txn, error = %e, "Commit failed, rolling back");
            if let Err(rollback) = self.send_rollback().await {
                warn!(%txn, error = %rollback, "Rollback after failed commit failed");
            }
        }
        result
    }

    /// Discards staged writes and releases the locks.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        let response = self.enqueue_rollback().await;
        self.finished = true;
        receive(response?).await
    }

    async fn send_rollback(&self) -> Result<(), StoreError> {
        receive(self.enqueue_rollback().await?).await
    }

    async fn enqueue_rollback(
        &self,
    ) -> Result<oneshot::Receiver<Result<(), StoreError>>, StoreError> {
        let txn = self.id;
        self.client
            .enqueue(|respond_to| StoreRequest::Rollback {
                txn,
                respond_to: Some(respond_to),
            })
            .await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!(txn = %self.id, "Transaction dropped without commit");
            self.client.rollback_detached(self.id);
        }
    }
}
