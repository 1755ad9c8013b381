//! # Store Actor
//!
//! This module defines the `StoreActor`, the single owner of every stock record. It
//! implements the "Server" side of the Actor Model: requests are processed one at a
//! time, so a committed write is visible to the next request in full or not at all.

use crate::framework::client::StoreClient;
use crate::framework::lock_table::{DeferredWrite, LockTable, Waiter};
use crate::framework::message::{Response, StoreRequest};
use crate::framework::{StoreError, TxnId};
use crate::model::{Stock, StockCreate, StockId, Version};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Book-keeping for one open transaction.
#[derive(Debug, Default)]
struct TxnState {
    held: Vec<StockId>,
    waiting_on: Option<StockId>,
}

/// The actor that owns all stock records, their row locks and the open transactions.
///
/// # Architecture Note
/// This struct is the "Server" half of the store. It owns the state (`records`) and
/// the receiver end of the channel.
///
/// **Concurrency Model**:
/// The actor never awaits while handling a request. Row locks are therefore not
/// "held" by a blocked thread; a request that has to wait is parked in the
/// [`LockTable`] together with its response channel and answered when the holder
/// commits or rolls back.
///
/// # Operations
///
/// * **Get**: Returns the committed record. Staged writes stay invisible.
/// * **CompareAndSwap / Save**: Apply immediately on a free row; queue behind the lock
///   holder otherwise.
/// * **GetForUpdate**: Grants the row lock or parks the caller in FIFO order.
/// * **Commit**: Applies staged writes (one version bump per row) and hands each
///   released row to the next waiter.
/// * **Rollback**: Discards staged writes, withdraws a pending wait and releases locks.
pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    records: HashMap<StockId, Stock>,
    locks: LockTable,
    transactions: HashMap<TxnId, TxnState>,
    next_id: u32,
    next_txn: u64,
}

impl StoreActor {
    /// Creates a new `StoreActor` and its associated `StoreClient`.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - The capacity of the MPSC channel. If the channel is full,
    ///   calls to the client will wait until there is space.
    pub fn new(buffer_size: usize) -> (Self, StoreClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            records: HashMap::new(),
            locks: LockTable::new(),
            transactions: HashMap::new(),
            next_id: 1,
            next_txn: 1,
        };
        (actor, StoreClient::new(sender))
    }

    /// Runs the actor's event loop until a `Shutdown` request arrives or every client is gone.
    pub async fn run(mut self) {
        info!("Store started");

        while let Some(msg) = self.receiver.recv().await {
            if let StoreRequest::Shutdown = msg {
                info!("Shutdown requested");
                break;
            }
            self.handle(msg);
        }

        if !self.transactions.is_empty() {
            warn!(open = self.transactions.len(), "Abandoning open transactions");
        }
        info!(size = self.records.len(), "Shutdown");
    }

    fn handle(&mut self, msg: StoreRequest) {
        match msg {
            StoreRequest::Create { params, respond_to } => self.create(params, respond_to),
            StoreRequest::Get { id, respond_to } => {
                let result = self.records.get(&id).cloned().ok_or(StoreError::NotFound(id));
                debug!(stock_id = %id, found = result.is_ok(), "Get");
                let _ = respond_to.send(result);
            }
            StoreRequest::CompareAndSwap {
                id,
                expected,
                quantity,
                respond_to,
            } => self.write(
                id,
                DeferredWrite::CompareAndSwap {
                    expected,
                    quantity,
                    respond_to,
                },
            ),
            StoreRequest::Save {
                id,
                quantity,
                respond_to,
            } => self.write(id, DeferredWrite::Save { quantity, respond_to }),
            StoreRequest::Begin { respond_to } => {
                let txn = TxnId(self.next_txn);
                self.next_txn += 1;
                self.transactions.insert(txn, TxnState::default());
                debug!(%txn, open = self.transactions.len(), "Begin");
                let _ = respond_to.send(Ok(txn));
            }
            StoreRequest::GetForUpdate {
                txn,
                id,
                respond_to,
            } => self.get_for_update(txn, id, respond_to),
            StoreRequest::Stage {
                txn,
                id,
                quantity,
                respond_to,
            } => {
                let result = if !self.transactions.contains_key(&txn) {
                    Err(StoreError::UnknownTransaction(txn))
                } else if self.locks.stage(id, txn, quantity) {
                    debug!(stock_id = %id, %txn, quantity, "Staged");
                    Ok(())
                } else {
                    Err(StoreError::NotLocked { id, txn })
                };
                let _ = respond_to.send(result);
            }
            StoreRequest::Commit { txn, respond_to } => {
                let result = self.finish(txn, true);
                let _ = respond_to.send(result);
            }
            StoreRequest::Rollback { txn, respond_to } => {
                let result = self.finish(txn, false);
                match respond_to {
                    Some(respond_to) => {
                        let _ = respond_to.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            debug!(%txn, error = %e, "Detached rollback ignored");
                        }
                    }
                }
            }
            // Handled by the run loop.
            StoreRequest::Shutdown => {}
        }
    }

    fn create(&mut self, params: StockCreate, respond_to: Response<StockId>) {
        debug!(?params, "Create");
        let id = StockId::from(self.next_id);
        self.next_id += 1;
        let stock = Stock::new(id, params.product_id, params.quantity);
        self.records.insert(id, stock);
        info!(stock_id = %id, product_id = %params.product_id, quantity = params.quantity, size = self.records.len(), "Created");
        let _ = respond_to.send(Ok(id));
    }

    /// Applies a non-transactional write, or parks it behind the current row lock.
    fn write(&mut self, id: StockId, write: DeferredWrite) {
        match self.locks.enqueue(id, Waiter::Write(write)) {
            Ok(()) => debug!(stock_id = %id, "Write deferred behind row lock"),
            Err(waiter) => self.hand_over(id, VecDeque::from([waiter])),
        }
    }

    fn apply(&mut self, id: StockId, write: DeferredWrite) {
        let Some(stock) = self.records.get_mut(&id) else {
            match write {
                DeferredWrite::Save { respond_to, .. } => {
                    let _ = respond_to.send(Err(StoreError::NotFound(id)));
                }
                DeferredWrite::CompareAndSwap { respond_to, .. } => {
                    let _ = respond_to.send(Err(StoreError::NotFound(id)));
                }
            }
            return;
        };

        match write {
            DeferredWrite::Save {
                quantity,
                respond_to,
            } => {
                let level = stock.write(quantity);
                info!(stock_id = %id, quantity, version = %level.version, "Saved");
                let _ = respond_to.send(Ok(stock.clone()));
            }
            DeferredWrite::CompareAndSwap {
                expected,
                quantity,
                respond_to,
            } => {
                let swapped = swap_if_current(stock, expected, quantity);
                if swapped {
                    info!(stock_id = %id, quantity, version = %stock.version, "Swapped");
                } else {
                    debug!(stock_id = %id, %expected, actual = %stock.version, "Version mismatch");
                }
                let _ = respond_to.send(Ok(swapped));
            }
        }
    }

    fn get_for_update(&mut self, txn: TxnId, id: StockId, respond_to: Response<Stock>) {
        if !self.transactions.contains_key(&txn) {
            let _ = respond_to.send(Err(StoreError::UnknownTransaction(txn)));
            return;
        }
        if !self.records.contains_key(&id) {
            let _ = respond_to.send(Err(StoreError::NotFound(id)));
            return;
        }

        if self.locks.try_lock(id, txn) {
            self.grant(txn, id, respond_to);
            return;
        }

        debug!(stock_id = %id, %txn, holder = ?self.locks.holder(id), "Waiting for row lock");
        if let Some(state) = self.transactions.get_mut(&txn) {
            state.waiting_on = Some(id);
        }
        if let Err(waiter) = self.locks.enqueue(id, Waiter::Lock { txn, respond_to }) {
            self.hand_over(id, VecDeque::from([waiter]));
        }
    }

    /// Records `txn` as holder of `id` and answers its `GetForUpdate`.
    fn grant(&mut self, txn: TxnId, id: StockId, respond_to: Response<Stock>) {
        if let Some(state) = self.transactions.get_mut(&txn) {
            state.waiting_on = None;
            if !state.held.contains(&id) {
                state.held.push(id);
            }
        }
        let result = self.records.get(&id).cloned().ok_or(StoreError::NotFound(id));
        debug!(stock_id = %id, %txn, "Lock granted");
        let _ = respond_to.send(result);
    }

    /// Serves the requests queued behind a released row until one of them takes the lock.
    fn hand_over(&mut self, id: StockId, mut waiters: VecDeque<Waiter>) {
        while let Some(waiter) = waiters.pop_front() {
            match waiter {
                Waiter::Write(write) => self.apply(id, write),
                Waiter::Lock { txn, respond_to } => {
                    if respond_to.is_closed() || !self.transactions.contains_key(&txn) {
                        debug!(stock_id = %id, %txn, "Skipping abandoned lock wait");
                        continue;
                    }
                    self.locks.grant(id, txn, std::mem::take(&mut waiters));
                    self.grant(txn, id, respond_to);
                    return;
                }
            }
        }
    }

    /// Ends a transaction. Staged writes are applied only when `commit` is set.
    fn finish(&mut self, txn: TxnId, commit: bool) -> Result<(), StoreError> {
        let state = self
            .transactions
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;

        if let Some(waiting) = state.waiting_on {
            self.locks.withdraw(waiting, txn);
        }

        for id in state.held {
            let Some(released) = self.locks.release(id, txn) else {
                continue;
            };
            if let (true, Some(quantity)) = (commit, released.staged) {
                if let Some(stock) = self.records.get_mut(&id) {
                    let level = stock.write(quantity);
                    info!(stock_id = %id, %txn, quantity, version = %level.version, "Committed");
                }
            }
            self.hand_over(id, released.waiters);
        }

        if commit {
            debug!(%txn, locked = self.locks.locked_rows(), "Commit");
        } else {
            info!(%txn, locked = self.locks.locked_rows(), "Rolled back");
        }
        Ok(())
    }
}

fn swap_if_current(stock: &mut Stock, expected: Version, quantity: u64) -> bool {
    if stock.version != expected {
        return false;
    }
    stock.write(quantity);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProductId;
    use std::time::Duration;

    async fn spawn_with_stock(quantity: u64) -> (StoreClient, StockId) {
        let (actor, client) = StoreActor::new(16);
        tokio::spawn(actor.run());
        let id = client
            .create(StockCreate {
                product_id: ProductId(1),
                quantity,
            })
            .await
            .unwrap();
        (client, id)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (client, id) = spawn_with_stock(100).await;
        assert_eq!(id, StockId(1));

        let stock = client.get(id).await.unwrap();
        assert_eq!(stock.quantity, 100);
        assert_eq!(stock.version, Version::INITIAL);
        assert_eq!(stock.product_id, ProductId(1));

        assert_eq!(
            client.get(StockId(99)).await,
            Err(StoreError::NotFound(StockId(99)))
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_checks_version() {
        let (client, id) = spawn_with_stock(10).await;

        assert!(client.compare_and_swap(id, Version(0), 2).await.unwrap());
        assert!(!client.compare_and_swap(id, Version(0), 2).await.unwrap());

        let stock = client.get(id).await.unwrap();
        assert_eq!(stock.quantity, 2);
        assert_eq!(stock.version, Version(1));
    }

    #[tokio::test]
    async fn test_staged_write_invisible_until_commit() {
        let (client, id) = spawn_with_stock(10).await;

        let txn = client.begin().await.unwrap();
        let locked = txn.get_for_update(id, None).await.unwrap();
        assert_eq!(locked.quantity, 10);
        txn.save(id, 7).await.unwrap();

        // Plain readers see the committed value only
        assert_eq!(client.get(id).await.unwrap().quantity, 10);

        txn.commit().await.unwrap();
        let stock = client.get(id).await.unwrap();
        assert_eq!(stock.quantity, 7);
        assert_eq!(stock.version, Version(1));
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_write() {
        let (client, id) = spawn_with_stock(10).await;

        let txn = client.begin().await.unwrap();
        txn.get_for_update(id, None).await.unwrap();
        txn.save(id, 1).await.unwrap();
        txn.rollback().await.unwrap();

        let stock = client.get(id).await.unwrap();
        assert_eq!(stock.quantity, 10);
        assert_eq!(stock.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn test_save_without_lock_is_rejected() {
        let (client, id) = spawn_with_stock(10).await;

        let txn = client.begin().await.unwrap();
        let result = txn.save(id, 3).await;
        assert!(matches!(result, Err(StoreError::NotLocked { .. })));
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_locker_waits_for_commit() {
        let (client, id) = spawn_with_stock(10).await;

        let first = client.begin().await.unwrap();
        first.get_for_update(id, None).await.unwrap();

        let second_client = client.clone();
        let waiter = tokio::spawn(async move {
            let second = second_client.begin().await.unwrap();
            let seen = second.get_for_update(id, None).await.unwrap();
            second.commit().await.unwrap();
            seen
        });

        // The waiter cannot get through while the first transaction holds the row
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.save(id, 4).await.unwrap();
        first.commit().await.unwrap();

        let seen = waiter.await.unwrap();
        assert_eq!(seen.quantity, 4);
        assert_eq!(seen.version, Version(1));
    }

    #[tokio::test]
    async fn test_deferred_swap_sees_committed_version() {
        let (client, id) = spawn_with_stock(10).await;

        let txn = client.begin().await.unwrap();
        txn.get_for_update(id, None).await.unwrap();
        txn.save(id, 5).await.unwrap();

        let swap_client = client.clone();
        let swap = tokio::spawn(async move { swap_client.compare_and_swap(id, Version(0), 9).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        txn.commit().await.unwrap();

        // The swap was queued behind the lock and lost against the committed write
        assert_eq!(swap.await.unwrap(), Ok(false));
        assert_eq!(client.get(id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_lock_timeout_then_rollback_leaves_lock_with_holder() {
        let (client, id) = spawn_with_stock(10).await;

        let holder = client.begin().await.unwrap();
        holder.get_for_update(id, None).await.unwrap();

        let late = client.begin().await.unwrap();
        let result = late
            .get_for_update(id, Some(Duration::from_millis(30)))
            .await;
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
        late.rollback().await.unwrap();

        holder.save(id, 3).await.unwrap();
        holder.commit().await.unwrap();
        assert_eq!(client.get(id).await.unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock() {
        let (client, id) = spawn_with_stock(10).await;

        {
            let txn = client.begin().await.unwrap();
            txn.get_for_update(id, None).await.unwrap();
            txn.save(id, 0).await.unwrap();
            // dropped without commit
        }

        let txn = client.begin().await.unwrap();
        let stock = txn
            .get_for_update(id, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(stock.quantity, 10);
        txn.commit().await.unwrap();
    }

    /// Receives and handles one request on an actor that is driven by hand.
    async fn step(actor: &mut StoreActor) {
        let msg = actor.receiver.recv().await.expect("channel open");
        actor.handle(msg);
    }

    #[tokio::test]
    async fn test_commit_cancelled_on_full_channel_releases_lock() {
        let (mut actor, client) = StoreActor::new(1);

        let (_, id) = tokio::join!(
            step(&mut actor),
            client.create(StockCreate {
                product_id: ProductId(1),
                quantity: 10,
            })
        );
        let id = id.unwrap();
        let (_, txn) = tokio::join!(step(&mut actor), client.begin());
        let txn = txn.unwrap();
        let (_, locked) = tokio::join!(step(&mut actor), txn.get_for_update(id, None));
        locked.unwrap();
        let (_, staged) = tokio::join!(step(&mut actor), txn.save(id, 0));
        staged.unwrap();

        // Occupy the single channel slot so the commit cannot be queued
        let reader = client.clone();
        let blocked_read = tokio::spawn(async move { reader.get(id).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let outcome = tokio::time::timeout(Duration::from_millis(20), txn.commit()).await;
        assert!(outcome.is_err(), "commit should still be waiting for channel space");

        // The read, then the rollback issued by the dropped guard
        step(&mut actor).await;
        tokio::time::timeout(Duration::from_secs(1), step(&mut actor))
            .await
            .expect("rollback delivered");

        assert_eq!(actor.locks.holder(id), None);
        assert!(actor.transactions.is_empty());
        assert_eq!(actor.records[&id].quantity, 10);
        assert_eq!(blocked_read.await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn test_commit_queued_before_cancel_still_applies() {
        let (mut actor, client) = StoreActor::new(4);

        let (_, id) = tokio::join!(
            step(&mut actor),
            client.create(StockCreate {
                product_id: ProductId(1),
                quantity: 10,
            })
        );
        let id = id.unwrap();
        let (_, txn) = tokio::join!(step(&mut actor), client.begin());
        let txn = txn.unwrap();
        let (_, locked) = tokio::join!(step(&mut actor), txn.get_for_update(id, None));
        locked.unwrap();
        let (_, staged) = tokio::join!(step(&mut actor), txn.save(id, 6));
        staged.unwrap();

        // Nobody answers, so the commit is queued and then abandoned
        let outcome = tokio::time::timeout(Duration::from_millis(20), txn.commit()).await;
        assert!(outcome.is_err());

        step(&mut actor).await;
        assert!(actor.receiver.try_recv().is_err(), "no rollback after a queued commit");
        assert_eq!(actor.locks.holder(id), None);
        assert_eq!(actor.records[&id].quantity, 6);
        assert_eq!(actor.records[&id].version, Version(1));
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor_with_live_clients() {
        let (actor, client) = StoreActor::new(4);
        let handle = tokio::spawn(actor.run());

        client.shutdown().await.unwrap();
        handle.await.unwrap();

        assert_eq!(client.get(StockId(1)).await, Err(StoreError::ActorClosed));
    }
}
