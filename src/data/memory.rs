//! In-memory datastore.
//!
//! Useful for tests and standalone runs. Transactions are snapshot-based:
//! `begin` captures every table, rollback restores the capture (tables
//! created after the capture are emptied), commit discards it. Dropping a
//! transaction without committing keeps the writes: they are already
//! applied to the shared tables.
//!
//! Record operations from other logical operations are not isolated from an
//! open transaction; a unit of work is scoped to one operation, which is
//! the only isolation this backend promises.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::store::{Datastore, RecordStore, Result, StoreTransaction};

type Rows = BTreeMap<String, Value>;

struct MemoryRecords {
    rows: RwLock<Rows>,
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: Value) -> Result<()> {
        self.rows.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Value>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.read().await.len() as u64)
    }
}

struct MemoryInner {
    tables: StdRwLock<HashMap<String, Arc<MemoryRecords>>>,
}

impl MemoryInner {
    fn table(&self, kind: &str) -> Arc<MemoryRecords> {
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
        {
            return Arc::clone(table);
        }
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tables.entry(kind.to_string()).or_insert_with(|| {
            Arc::new(MemoryRecords {
                rows: RwLock::new(Rows::new()),
            })
        }))
    }

    fn snapshot_targets(&self) -> Vec<(String, Arc<MemoryRecords>)> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(kind, table)| (kind.clone(), Arc::clone(table)))
            .collect()
    }
}

/// In-memory [`Datastore`] with snapshot transactions.
#[derive(Clone)]
pub struct MemoryDatastore {
    inner: Arc<MemoryInner>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                tables: StdRwLock::new(HashMap::new()),
            }),
        }
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let mut saved = HashMap::new();
        for (kind, table) in self.inner.snapshot_targets() {
            saved.insert(kind, table.rows.read().await.clone());
        }
        debug!(tables = saved.len(), "memory transaction started");
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            saved,
        }))
    }

    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        self.inner.table(kind)
    }
}

struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    saved: HashMap<String, Rows>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        for (kind, table) in self.inner.snapshot_targets() {
            let restored = self.saved.remove(&kind).unwrap_or_default();
            *table.rows.write().await = restored;
        }
        debug!("memory transaction rolled back");
        Ok(())
    }

    // Tables are shared, so transactional record access is the table itself;
    // the snapshot decides what survives.
    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        self.inner.table(kind)
    }
}
