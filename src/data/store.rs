//! Persistence collaborator interfaces.
//!
//! The composition core never talks to a database directly; it consumes a
//! [`Datastore`] that can begin transactions and hand out type-erased
//! per-kind [`RecordStore`]s. How a backend executes a read or write is its
//! own business.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by datastore backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("unknown storage type: {0}")]
    UnknownStorageType(String),
}

/// Type-erased record access for one entity kind.
///
/// Records are JSON documents keyed by a string id; typed access goes
/// through [`Repository`](crate::data::Repository).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, record: Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<Value>>;
    async fn count(&self) -> Result<u64>;
}

/// An open transaction against the underlying store.
///
/// The handle exclusively owns its transaction resource. Dropping it
/// without calling either method releases the resource; whether that
/// discards or keeps the writes is the backend's drop semantics.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Record access for one entity kind, routed through this transaction.
    fn records(&self, kind: &str) -> Arc<dyn RecordStore>;
}

/// The persistence collaborator: transactions plus per-kind record access.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Begin a transaction owned by the returned handle. Transactions from
    /// separate `begin` calls are independent of each other.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Direct record access for one entity kind, outside any transaction.
    fn records(&self, kind: &str) -> Arc<dyn RecordStore>;
}
