//! # Mock Framework
//!
//! Utilities for testing decrement strategies in isolation.
//!
//! [`MockStore`] hands out a real [`StoreClient`] whose requests are answered from a
//! queue of scripted expectations instead of a running [`StoreActor`](crate::framework::StoreActor).
//! This makes failure paths (commit errors, lost compare-and-swap races) deterministic.

use crate::framework::message::StoreRequest;
use crate::framework::{StoreClient, StoreError, TxnId};
use crate::model::{Stock, StockId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// Represents an expected request to the mock store, with the response to give.
#[derive(Debug)]
enum Expectation {
    Create {
        response: Result<StockId, StoreError>,
    },
    Get {
        id: StockId,
        response: Result<Stock, StoreError>,
    },
    CompareAndSwap {
        id: StockId,
        response: Result<bool, StoreError>,
    },
    Save {
        id: StockId,
        response: Result<Stock, StoreError>,
    },
    Begin {
        response: Result<TxnId, StoreError>,
    },
    GetForUpdate {
        id: StockId,
        response: Result<Stock, StoreError>,
    },
    Stage {
        id: StockId,
        response: Result<(), StoreError>,
    },
    Commit {
        response: Result<(), StoreError>,
    },
    Rollback {
        response: Result<(), StoreError>,
    },
}

type Expectations = Arc<Mutex<VecDeque<Expectation>>>;

/// A mock store with expectation tracking for fluent testing.
///
/// # Example
/// ```ignore
/// let mut mock = MockStore::new();
/// mock.expect_get(StockId(1)).return_ok(stock.clone());
/// mock.expect_compare_and_swap(StockId(1)).return_ok(true);
///
/// let client = mock.client();
/// // Use client in tests...
/// mock.verify(); // Ensures all expectations were met
/// ```
pub struct MockStore {
    client: StoreClient,
    expectations: Expectations,
    mismatches: Arc<Mutex<Vec<String>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockStore {
    /// Creates a new mock store with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest>(100);
        let expectations: Expectations = Arc::new(Mutex::new(VecDeque::new()));
        let mismatches = Arc::new(Mutex::new(Vec::new()));
        let expectations_clone = expectations.clone();
        let mismatches_clone = mismatches.clone();

        // Spawn background task to answer requests
        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = expectations_clone.lock().unwrap().pop_front();

                match (request, expectation) {
                    (StoreRequest::Create { respond_to, .. }, Some(Expectation::Create { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Get { id, respond_to }, Some(Expectation::Get { id: expected, response }))
                        if id == expected =>
                    {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::CompareAndSwap { id, respond_to, .. },
                        Some(Expectation::CompareAndSwap { id: expected, response }),
                    ) if id == expected => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Save { id, respond_to, .. }, Some(Expectation::Save { id: expected, response }))
                        if id == expected =>
                    {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Begin { respond_to }, Some(Expectation::Begin { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::GetForUpdate { id, respond_to, .. },
                        Some(Expectation::GetForUpdate { id: expected, response }),
                    ) if id == expected => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Stage { id, respond_to, .. }, Some(Expectation::Stage { id: expected, response }))
                        if id == expected =>
                    {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Commit { respond_to, .. }, Some(Expectation::Commit { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::Rollback { respond_to, .. }, Some(Expectation::Rollback { response })) => {
                        if let Some(respond_to) = respond_to {
                            let _ = respond_to.send(response);
                        }
                    }
                    (StoreRequest::Shutdown, _) => break,
                    (request, expectation) => {
                        // Dropping the request closes its response channel; the caller sees ActorDropped
                        mismatches_clone
                            .lock()
                            .unwrap()
                            .push(format!("got {request:?}, expected {expectation:?}"));
                    }
                }
            }
        });

        Self {
            client: StoreClient::new(sender),
            expectations,
            mismatches,
            _handle: handle,
        }
    }

    /// Returns the client for use in tests.
    pub fn client(&self) -> StoreClient {
        self.client.clone()
    }

    pub fn expect_create(&mut self) -> ExpectationBuilder<StockId> {
        self.builder(|response| Expectation::Create { response })
    }

    pub fn expect_get(&mut self, id: StockId) -> ExpectationBuilder<Stock> {
        self.builder(move |response| Expectation::Get { id, response })
    }

    pub fn expect_compare_and_swap(&mut self, id: StockId) -> ExpectationBuilder<bool> {
        self.builder(move |response| Expectation::CompareAndSwap { id, response })
    }

    pub fn expect_save(&mut self, id: StockId) -> ExpectationBuilder<Stock> {
        self.builder(move |response| Expectation::Save { id, response })
    }

    pub fn expect_begin(&mut self) -> ExpectationBuilder<TxnId> {
        self.builder(|response| Expectation::Begin { response })
    }

    pub fn expect_get_for_update(&mut self, id: StockId) -> ExpectationBuilder<Stock> {
        self.builder(move |response| Expectation::GetForUpdate { id, response })
    }

    /// Expects a staged write inside a transaction.
    pub fn expect_stage(&mut self, id: StockId) -> ExpectationBuilder<()> {
        self.builder(move |response| Expectation::Stage { id, response })
    }

    pub fn expect_commit(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::Commit { response })
    }

    pub fn expect_rollback(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::Rollback { response })
    }

    fn builder<T>(
        &self,
        make: impl FnOnce(Result<T, StoreError>) -> Expectation + Send + 'static,
    ) -> ExpectationBuilder<T> {
        ExpectationBuilder {
            make: Box::new(make),
            expectations: self.expectations.clone(),
        }
    }

    /// Verifies that all expectations were met and no unexpected request arrived.
    pub fn verify(&self) {
        let mismatches = self.mismatches.lock().unwrap();
        if !mismatches.is_empty() {
            panic!("Unexpected requests: {:?}", *mismatches);
        }
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a single expectation; finish it with `return_ok` or `return_err`.
pub struct ExpectationBuilder<T> {
    make: Box<dyn FnOnce(Result<T, StoreError>) -> Expectation + Send>,
    expectations: Expectations,
}

impl<T> ExpectationBuilder<T> {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: T) {
        let expectation = (self.make)(Ok(value));
        self.expectations.lock().unwrap().push_back(expectation);
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: StoreError) {
        let expectation = (self.make)(Err(error));
        self.expectations.lock().unwrap().push_back(expectation);
    }
}
