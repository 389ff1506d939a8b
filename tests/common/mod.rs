//! Shared fixtures for integration tests.
//!
//! Provides a counting datastore wrapper plus a small order-taking domain:
//! entities, commands, queries, handlers, and steps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use weft::data::{Datastore, MemoryDatastore, RecordStore, Result, StoreTransaction};
use weft::{
    Command, CommandHandler, CommandResponse, Entity, HandlerError, Query, QueryHandler,
    UnitOfWork, UnitOfWorkExt,
};

/// Transaction lifecycle counters shared with [`CountingDatastore`].
#[derive(Default)]
pub struct TxCounters {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl TxCounters {
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.begins.load(Ordering::SeqCst),
            self.commits.load(Ordering::SeqCst),
            self.rollbacks.load(Ordering::SeqCst),
        )
    }
}

/// Memory datastore that counts transaction lifecycle calls.
#[derive(Clone)]
pub struct CountingDatastore {
    inner: MemoryDatastore,
    pub counters: Arc<TxCounters>,
}

impl CountingDatastore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDatastore::new(),
            counters: Arc::new(TxCounters::default()),
        }
    }
}

#[async_trait]
impl Datastore for CountingDatastore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        let tx = self.inner.begin().await?;
        Ok(Box::new(CountingTransaction {
            inner: tx,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        self.inner.records(kind)
    }
}

struct CountingTransaction {
    inner: Box<dyn StoreTransaction>,
    counters: Arc<TxCounters>,
}

#[async_trait]
impl StoreTransaction for CountingTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }

    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        self.inner.records(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub total: i64,
}

impl Entity for Order {
    type Key = u64;
    const KIND: &'static str = "orders";

    fn key(&self) -> u64 {
        self.id
    }
}

pub struct PlaceOrder {
    pub id: u64,
    pub total: i64,
}

impl Command for PlaceOrder {}

/// Places the order, then fails if the total is negative. The write happens
/// before the failure so rollback tests can observe it being discarded.
pub struct PlaceOrderHandler {
    pub unit_of_work: Arc<dyn UnitOfWork>,
}

#[derive(Debug, thiserror::Error)]
#[error("order total must not be negative")]
pub struct NegativeTotal;

#[async_trait]
impl CommandHandler<PlaceOrder> for PlaceOrderHandler {
    async fn handle(&self, command: PlaceOrder) -> std::result::Result<CommandResponse, HandlerError> {
        let orders = self.unit_of_work.repository::<Order>();
        orders
            .add(&Order {
                id: command.id,
                total: command.total,
            })
            .await?;
        if command.total < 0 {
            return Err(HandlerError::new(NegativeTotal));
        }
        Ok(CommandResponse::with_result(command.id))
    }
}

pub struct CountOrders;

impl Query for CountOrders {
    type Output = u64;
}

pub struct CountOrdersHandler {
    pub unit_of_work: Arc<dyn UnitOfWork>,
}

#[async_trait]
impl QueryHandler<CountOrders> for CountOrdersHandler {
    async fn handle(&self, _query: CountOrders) -> std::result::Result<u64, HandlerError> {
        let count = self.unit_of_work.repository::<Order>().count(None).await?;
        Ok(count)
    }
}
