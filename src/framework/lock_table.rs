//! # Row Lock Table
//!
//! Exclusive row locks are kept apart from the records themselves. Each locked row has
//! one holding transaction, the write it has staged (if any) and a FIFO queue of
//! requests waiting for the lock to be released.

use crate::framework::message::Response;
use crate::framework::TxnId;
use crate::model::{Stock, StockId, Version};
use std::collections::{HashMap, VecDeque};

/// A request parked behind a row lock.
#[derive(Debug)]
pub(crate) enum Waiter {
    /// A transaction waiting in `GetForUpdate`.
    Lock {
        txn: TxnId,
        respond_to: Response<Stock>,
    },
    /// A non-transactional write that must not overtake the lock holder.
    Write(DeferredWrite),
}

#[derive(Debug)]
pub(crate) enum DeferredWrite {
    Save {
        quantity: u64,
        respond_to: Response<Stock>,
    },
    CompareAndSwap {
        expected: Version,
        quantity: u64,
        respond_to: Response<bool>,
    },
}

#[derive(Debug)]
struct RowLock {
    holder: TxnId,
    staged: Option<u64>,
    waiters: VecDeque<Waiter>,
}

/// What a holder leaves behind when it releases a row.
#[derive(Debug)]
pub(crate) struct Released {
    pub staged: Option<u64>,
    pub waiters: VecDeque<Waiter>,
}

#[derive(Debug, Default)]
pub(crate) struct LockTable {
    rows: HashMap<StockId, RowLock>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, id: StockId) -> Option<TxnId> {
        self.rows.get(&id).map(|row| row.holder)
    }

    /// Takes the lock if the row is free. Returns `true` when `txn` holds it afterwards.
    pub fn try_lock(&mut self, id: StockId, txn: TxnId) -> bool {
        match self.rows.get(&id) {
            Some(row) => row.holder == txn,
            None => {
                self.grant(id, txn, VecDeque::new());
                true
            }
        }
    }

    /// Installs `txn` as holder, carrying over the requests still queued.
    pub fn grant(&mut self, id: StockId, txn: TxnId, waiters: VecDeque<Waiter>) {
        self.rows.insert(
            id,
            RowLock {
                holder: txn,
                staged: None,
                waiters,
            },
        );
    }

    /// Parks a request behind the current holder. Hands the waiter back if the row is free.
    pub fn enqueue(&mut self, id: StockId, waiter: Waiter) -> Result<(), Waiter> {
        match self.rows.get_mut(&id) {
            Some(row) => {
                row.waiters.push_back(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Buffers a write under a lock held by `txn`.
    pub fn stage(&mut self, id: StockId, txn: TxnId, quantity: u64) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) if row.holder == txn => {
                row.staged = Some(quantity);
                true
            }
            _ => false,
        }
    }

    /// Drops the lock held by `txn`, returning its staged write and the queue behind it.
    pub fn release(&mut self, id: StockId, txn: TxnId) -> Option<Released> {
        if self.holder(id) != Some(txn) {
            return None;
        }
        self.rows.remove(&id).map(|row| Released {
            staged: row.staged,
            waiters: row.waiters,
        })
    }

    /// Removes a lock wait of `txn` from the queue of `id`.
    pub fn withdraw(&mut self, id: StockId, txn: TxnId) -> bool {
        let Some(row) = self.rows.get_mut(&id) else {
            return false;
        };
        let before = row.waiters.len();
        row.waiters
            .retain(|waiter| !matches!(waiter, Waiter::Lock { txn: waiting, .. } if *waiting == txn));
        row.waiters.len() != before
    }

    pub fn locked_rows(&self) -> usize {
        self.rows.len()
    }
}
